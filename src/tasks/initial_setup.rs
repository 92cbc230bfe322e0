use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{record_elapsed, INITIAL_SETUP, STOP_RESEARCH_KEY};
use crate::models::SearchAction;
use crate::research::ResearchComponents;

/// Broad first searches on the query, then the outline is drafted from what they found.
pub struct InitialSetupTask {
    components: Arc<ResearchComponents>,
}

impl InitialSetupTask {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self { components }
    }
}

#[async_trait]
impl Task for InitialSetupTask {
    fn id(&self) -> &str {
        INITIAL_SETUP
    }

    #[instrument(skip(self, context))]
    async fn run(&self, context: Context) -> Result<TaskResult, GraphError> {
        let start_time = std::time::Instant::now();
        info!("--- Performing Initial Setup ---");

        let c = &self.components;
        let query = c.state.read().await.query.clone();

        let mut boot_queries = c
            .planner
            .generate_queries(
                &query,
                c.settings.boot_queries,
                "diverse, broad web search queries to get an overview",
            )
            .await;
        if boot_queries.is_empty() {
            warn!("No boot queries generated. Searching for the query itself.");
            boot_queries.push(query.clone());
        }

        let actions: Vec<SearchAction> = boot_queries
            .into_iter()
            .map(|q| SearchAction {
                query: q,
                target_outline_topic: Some(query.clone()),
            })
            .collect();
        let report = c.actor.act(&actions).await;

        let outline = c.planner.draft_outline().await;
        info!("Drafted outline with {} main topics.", outline.len());

        let cycles = {
            let mut state = c.state.write().await;
            state.outline = outline;
            state.cycles = 1;
            state.cycles
        };
        context
            .set(STOP_RESEARCH_KEY, cycles >= c.settings.max_cycles)
            .await;

        record_elapsed(&context, INITIAL_SETUP, start_time.elapsed().as_millis() as u64).await;

        Ok(TaskResult::new(
            Some(format!(
                "Initial setup added {} chunks from {} queries",
                report.new_chunks,
                report.sources_by_query.len()
            )),
            NextAction::ContinueAndExecute,
        ))
    }
}
