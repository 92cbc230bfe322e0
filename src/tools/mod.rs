//! Boundaries to the outside world: the reasoning model, the embedding model,
//! web search and page fetching.

pub mod fetch;
pub mod llm;
pub mod tavily;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::SharedFifoCache;
use crate::config::Settings;
use crate::error::ServiceError;
use crate::models::SearchHit;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Overrides the client's default chat model when set.
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: None,
            temperature: 0.5,
            max_tokens: 1024,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// One slot per input; `None` marks an individual failure.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>>;
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Empty on failure.
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Cleaned plain text, or an empty string on any failure.
    async fn fetch(&self, url: &str) -> String;
}

/// The collaborators a research session talks to, constructed once and
/// handed to each component.
///
/// `embed_cache` outlives individual sessions: embeddings computed for one
/// query are reused by later ones until evicted.
#[derive(Clone)]
pub struct Services {
    pub reasoning: Arc<dyn ReasoningClient>,
    pub embeddings: Arc<dyn EmbeddingClient>,
    pub search: Arc<dyn SearchClient>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub embed_cache: Arc<SharedFifoCache<String, Vec<f32>>>,
}

impl Services {
    pub fn new(
        reasoning: Arc<dyn ReasoningClient>,
        embeddings: Arc<dyn EmbeddingClient>,
        search: Arc<dyn SearchClient>,
        fetcher: Arc<dyn PageFetcher>,
        settings: &Settings,
    ) -> Self {
        Self {
            reasoning,
            embeddings,
            search,
            fetcher,
            embed_cache: Arc::new(SharedFifoCache::new(settings.embed_cache_capacity)),
        }
    }
}
