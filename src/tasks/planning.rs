use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{record_elapsed, PLANNING, PLAN_KEY, RESEARCH_COMPLETE_KEY};
use crate::research::ResearchComponents;

pub struct PlanningTask {
    components: Arc<ResearchComponents>,
}

impl PlanningTask {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self { components }
    }
}

#[async_trait]
impl Task for PlanningTask {
    fn id(&self) -> &str {
        PLANNING
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        let c = &self.components;
        let cycle = c.state.read().await.cycles + 1;
        info!("--- Starting Agentic Cycle {}/{} ---", cycle, c.settings.max_cycles);

        let plan = c.planner.plan_and_critique().await;
        let complete = plan.is_complete();
        if complete {
            info!("Planner has concluded the research. Moving to synthesis.");
        } else {
            info!("Agent status: {}", c.planner.summarize_plan(&plan).await);
        }

        context.set(PLAN_KEY, plan).await;
        context.set(RESEARCH_COMPLETE_KEY, complete).await;
        record_elapsed(&context, PLANNING, start_time.elapsed().as_millis() as u64).await;

        Ok(TaskResult::new(
            Some(format!("Planning for cycle {} finished", cycle)),
            NextAction::ContinueAndExecute,
        ))
    }
}
