//! The research cycle as a graph-flow workflow:
//! `initial_setup -> planning -> acting -> analyzing -> planning ...`,
//! leaving for `synthesis` when the plan is empty, returns diminish or the
//! cycle budget runs out.

mod acting;
mod analyzing;
mod initial_setup;
mod planning;
mod synthesis;

pub use acting::ActingTask;
pub use analyzing::AnalyzingTask;
pub use initial_setup::InitialSetupTask;
pub use planning::PlanningTask;
pub use synthesis::SynthesisTask;

use graph_flow::{Context, Graph, GraphBuilder};
use std::collections::HashMap;
use std::sync::Arc;

use crate::research::ResearchComponents;

pub const INITIAL_SETUP: &str = "initial_setup";
pub const PLANNING: &str = "planning";
pub const ACTING: &str = "acting";
pub const ANALYZING: &str = "analyzing";
pub const SYNTHESIS: &str = "synthesis";

pub const PLAN_KEY: &str = "plan";
pub const RESEARCH_COMPLETE_KEY: &str = "research_complete";
pub const STOP_RESEARCH_KEY: &str = "stop_research";
pub const REPORT_KEY: &str = "report";
pub const TASK_TIMES_KEY: &str = "task_times";

/// Builds the research workflow for one session.
pub fn build_graph(components: Arc<ResearchComponents>) -> Graph {
    GraphBuilder::new("deep_research")
        .add_task(Arc::new(InitialSetupTask::new(components.clone())))
        .add_task(Arc::new(PlanningTask::new(components.clone())))
        .add_task(Arc::new(ActingTask::new(components.clone())))
        .add_task(Arc::new(AnalyzingTask::new(components.clone())))
        .add_task(Arc::new(SynthesisTask::new(components)))
        .add_conditional_edge(
            INITIAL_SETUP,
            |ctx: &Context| ctx.get_sync::<bool>(STOP_RESEARCH_KEY).unwrap_or(false),
            SYNTHESIS,
            PLANNING,
        )
        .add_conditional_edge(
            PLANNING,
            |ctx: &Context| ctx.get_sync::<bool>(RESEARCH_COMPLETE_KEY).unwrap_or(true),
            SYNTHESIS,
            ACTING,
        )
        .add_edge(ACTING, ANALYZING)
        .add_conditional_edge(
            ANALYZING,
            |ctx: &Context| ctx.get_sync::<bool>(STOP_RESEARCH_KEY).unwrap_or(false),
            SYNTHESIS,
            PLANNING,
        )
        .build()
}

/// Adds `elapsed_ms` to the running total for `task_id`. Tasks in the cycle run
/// several times per session.
async fn record_elapsed(context: &Context, task_id: &str, elapsed_ms: u64) {
    let mut task_times: HashMap<String, u64> =
        context.get(TASK_TIMES_KEY).await.unwrap_or_default();
    *task_times.entry(task_id.to_string()).or_default() += elapsed_ms;
    context.set(TASK_TIMES_KEY, task_times).await;
}
