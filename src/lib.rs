//! Autonomous multi-hop research agent.
//!
//! A session plans web searches, scores the evidence it retrieves for
//! relevance and novelty, tracks topical coverage to decide when it has
//! stopped learning, and writes a cited markdown report.

pub mod cache;
pub mod clustering;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod research;
pub mod state;
pub mod tasks;
pub mod text;
pub mod tools;

pub use config::Settings;
pub use error::{ResearchError, ServiceError};
pub use pipeline::{ResearchOutcome, ResearchPipeline};
pub use tools::Services;
