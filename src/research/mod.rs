//! The research engine: analysis, retrieval, planning and report writing over
//! one session's shared state.

pub mod actor;
pub mod analyst;
pub mod planner;
pub mod synthesizer;

pub use actor::{ActReport, Actor};
pub use analyst::{Analyst, Coverage, LatentTopic};
pub use planner::Planner;
pub use synthesizer::Synthesizer;

use std::sync::Arc;

use crate::config::Settings;
use crate::state::SharedState;
use crate::tools::Services;

/// Every component of one research session, wired to the same state.
pub struct ResearchComponents {
    pub state: SharedState,
    pub settings: Arc<Settings>,
    pub analyst: Arc<Analyst>,
    pub actor: Actor,
    pub planner: Planner,
    pub synthesizer: Synthesizer,
}

impl ResearchComponents {
    pub fn new(state: SharedState, services: Services, settings: Arc<Settings>) -> Self {
        let analyst = Arc::new(Analyst::new(
            state.clone(),
            services.clone(),
            settings.clone(),
        ));
        Self {
            actor: Actor::new(state.clone(), services.clone(), settings.clone(), analyst.clone()),
            planner: Planner::new(state.clone(), services.clone(), settings.clone(), analyst.clone()),
            synthesizer: Synthesizer::new(state.clone(), services, settings.clone(), analyst.clone()),
            state,
            settings,
            analyst,
        }
    }
}
