use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{record_elapsed, REPORT_KEY, SYNTHESIS};
use crate::research::ResearchComponents;

pub struct SynthesisTask {
    components: Arc<ResearchComponents>,
}

impl SynthesisTask {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self { components }
    }
}

#[async_trait]
impl Task for SynthesisTask {
    fn id(&self) -> &str {
        SYNTHESIS
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        info!("--- Writing final report ---");

        let report = self.components.synthesizer.synthesize().await;
        info!("Generated report with {} characters", report.len());
        context.set(REPORT_KEY, report).await;

        record_elapsed(&context, SYNTHESIS, start_time.elapsed().as_millis() as u64).await;

        Ok(TaskResult::new(
            Some("Report generated successfully".to_string()),
            NextAction::End,
        ))
    }
}
