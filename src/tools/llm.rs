use anyhow::Result;
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use rig::prelude::*;
use rig::providers::openai;
use tracing::{debug, error};

use super::{CompletionRequest, EmbeddingClient, ReasoningClient};
use crate::error::ServiceError;
use crate::text::truncate_chars;

fn openai_client() -> Result<openai::Client> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OpenAI API key not configured"))?;
    let client = match std::env::var("OPENAI_BASE_URL") {
        Ok(base_url) if !base_url.trim().is_empty() => openai::Client::from_url(&api_key, &base_url),
        _ => openai::Client::new(&api_key),
    };
    Ok(client)
}

/// Chat completions through rig's OpenAI provider.
pub struct OpenAiReasoner {
    client: openai::Client,
    default_model: String,
}

impl OpenAiReasoner {
    pub fn from_env(default_model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: openai_client()?,
            default_model: default_model.into(),
        })
    }
}

#[async_trait]
impl ReasoningClient for OpenAiReasoner {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        debug!(
            "Sending chat request to model '{}'. Max tokens: {}",
            model, request.max_tokens
        );

        let agent = self
            .client
            .agent(model)
            .preamble(&request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build();

        match agent.prompt(request.user.as_str()).await {
            Ok(response) => Ok(response.trim().to_string()),
            Err(e) => {
                error!("Chat request failed: {}", e);
                Err(ServiceError::Reasoning(e.to_string()))
            }
        }
    }
}

/// Embeddings through rig's OpenAI provider. Inputs are truncated to `max_chars`.
pub struct OpenAiEmbedder {
    client: openai::Client,
    model: String,
    max_chars: usize,
}

impl OpenAiEmbedder {
    pub fn from_env(model: impl Into<String>, max_chars: usize) -> Result<Self> {
        Ok(Self {
            client: openai_client()?,
            model: model.into(),
            max_chars,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let inputs: Vec<String> = texts
            .iter()
            .map(|text| truncate_chars(text, self.max_chars).to_string())
            .collect();
        let model = self.client.embedding_model(&self.model);

        let embeddings = model
            .embed_texts(inputs)
            .await
            .map_err(|e| ServiceError::Embedding(e.to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(ServiceError::Embedding(format!(
                "response size mismatch: sent {}, received {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }
        debug!("Sending batch embedding request for {} texts", texts.len());

        match self.request(texts).await {
            Ok(embeddings) => embeddings.into_iter().map(Some).collect(),
            Err(e) => {
                error!("Batch embedding failed for {} texts: {}", texts.len(), e);
                vec![None; texts.len()]
            }
        }
    }
}
