use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{record_elapsed, ANALYZING, STOP_RESEARCH_KEY};
use crate::research::ResearchComponents;

/// Measures information gain for the cycle and decides whether to keep going.
pub struct AnalyzingTask {
    components: Arc<ResearchComponents>,
}

impl AnalyzingTask {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self { components }
    }
}

#[async_trait]
impl Task for AnalyzingTask {
    fn id(&self) -> &str {
        ANALYZING
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        let c = &self.components;

        c.analyst.update_information_gain().await;

        let stop = if c.analyst.check_diminishing_returns().await {
            info!("Diminishing returns detected. Concluding research phase.");
            true
        } else {
            let mut state = c.state.write().await;
            state.cycles += 1;
            if state.cycles >= c.settings.max_cycles {
                info!("Maximum cycles reached. Moving to synthesis.");
                true
            } else {
                false
            }
        };

        context.set(STOP_RESEARCH_KEY, stop).await;
        record_elapsed(&context, ANALYZING, start_time.elapsed().as_millis() as u64).await;

        Ok(TaskResult::new(
            Some(if stop { "Research stopped" } else { "Continuing research" }.to_string()),
            NextAction::ContinueAndExecute,
        ))
    }
}
