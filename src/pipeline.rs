use graph_flow::{ExecutionStatus, FlowRunner, InMemorySessionStorage, Session, SessionStorage};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{ResearchError, Result};
use crate::research::ResearchComponents;
use crate::state::ResearchState;
use crate::tasks::{self, INITIAL_SETUP, REPORT_KEY, TASK_TIMES_KEY};
use crate::tools::Services;

/// A finished research session.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub session_id: String,
    pub report: String,
    /// Accumulated milliseconds per workflow task.
    pub task_times: HashMap<String, u64>,
}

/// Entry point for running research sessions against a fixed set of services.
#[derive(Clone)]
pub struct ResearchPipeline {
    services: Services,
    settings: Arc<Settings>,
}

impl ResearchPipeline {
    pub fn new(services: Services, settings: Settings) -> Self {
        Self {
            services,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Researches `query` and returns a markdown report.
    ///
    /// Never fails: errors come back as report text starting with `Error:`.
    pub async fn run(&self, query: &str) -> String {
        match self.run_with_timings(query).await {
            Ok(outcome) => outcome.report,
            Err(e) => format!("Error: {}", e),
        }
    }

    #[instrument(skip(self))]
    pub async fn run_with_timings(&self, query: &str) -> Result<ResearchOutcome> {
        let start_time = std::time::Instant::now();
        let session_id = Uuid::new_v4().to_string();
        info!("--- Starting Research Pipeline for session {} ---", session_id);

        let query_embedding = self
            .services
            .embeddings
            .embed_batch(&[query.to_string()])
            .await
            .pop()
            .flatten()
            .ok_or_else(|| {
                error!("Could not embed initial query. Aborting.");
                ResearchError::QueryEmbedding
            })?;

        let mut state = ResearchState::new(query);
        state.query_embedding = Some(query_embedding);
        let components = Arc::new(ResearchComponents::new(
            state.shared(),
            self.services.clone(),
            self.settings.clone(),
        ));

        let graph = Arc::new(tasks::build_graph(components));
        let storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let session = Session::new_from_task(session_id.clone(), INITIAL_SETUP);
        storage.save(session).await?;

        loop {
            let result = runner.run(&session_id).await?;
            match result.status {
                ExecutionStatus::Completed => {
                    info!("Workflow completed in {:?}", start_time.elapsed());
                    break;
                }
                ExecutionStatus::Paused { next_task_id, .. } => {
                    info!("Workflow paused, next task: {}", next_task_id);
                    continue;
                }
                ExecutionStatus::Error(e) => {
                    error!("Workflow error: {}", e);
                    return Err(ResearchError::WorkflowFailed(e));
                }
                _ => continue,
            }
        }

        let session = storage
            .get(&session_id)
            .await?
            .ok_or_else(|| ResearchError::MissingReport(session_id.clone()))?;
        let report: String = session
            .context
            .get(REPORT_KEY)
            .await
            .ok_or_else(|| ResearchError::MissingReport(session_id.clone()))?;
        let task_times = session
            .context
            .get(TASK_TIMES_KEY)
            .await
            .unwrap_or_default();

        Ok(ResearchOutcome {
            session_id,
            report,
            task_times,
        })
    }
}
