use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{record_elapsed, ACTING, PLAN_KEY};
use crate::models::{Plan, PlanAction};
use crate::research::ResearchComponents;

/// Applies outline changes from the plan and runs its searches.
pub struct ActingTask {
    components: Arc<ResearchComponents>,
}

impl ActingTask {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self { components }
    }
}

#[async_trait]
impl Task for ActingTask {
    fn id(&self) -> &str {
        ACTING
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        let c = &self.components;

        let plan: Plan = context
            .get(PLAN_KEY)
            .await
            .ok_or_else(|| GraphError::ContextError("Plan not found".to_string()))?;

        {
            let mut state = c.state.write().await;
            for action in &plan.actions {
                if let PlanAction::AddToOutline { topic, subtopics } = action {
                    info!("Planner requested to add topic to outline: '{}'", topic);
                    if !state.add_topic(topic, subtopics.clone()) {
                        warn!("Skipping request to add duplicate topic to outline: '{}'", topic);
                    }
                }
            }
        }

        let searches = plan.search_actions();
        let message = if searches.is_empty() {
            info!("No search actions in this cycle. Skipping action phase.");
            "No searches to run".to_string()
        } else {
            let report = c.actor.act(&searches).await;
            for (query, titles) in &report.sources_by_query {
                info!("Query '{}' added sources: {}", query, titles.join("; "));
            }
            format!("Added {} chunks", report.new_chunks)
        };

        record_elapsed(&context, ACTING, start_time.elapsed().as_millis() as u64).await;

        Ok(TaskResult::new(Some(message), NextAction::ContinueAndExecute))
    }
}
