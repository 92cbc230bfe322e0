use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{Chunk, OutlineEntry, Plan, Source};
use crate::text::hash_text;

/// Handle to the session state shared by every component of one research run.
pub type SharedState = Arc<RwLock<ResearchState>>;

/// Everything one research session knows: the evolving outline, the plan
/// history and the append-only knowledge store of sources, chunks and
/// embeddings.
#[derive(Debug, Clone, Default)]
pub struct ResearchState {
    pub query: String,
    pub query_embedding: Option<Vec<f32>>,
    pub cycles: usize,
    pub outline: Vec<OutlineEntry>,
    pub plan: Plan,
    pub critique_history: Vec<String>,
    pub information_gain_history: Vec<f32>,
    pub last_coverage_vector: Option<Vec<f32>>,
    pub results: Vec<Source>,
    pub url_to_source_index: HashMap<String, usize>,
    pub chunks: Vec<Chunk>,
    pub embedding_cache: HashMap<String, Vec<f32>>,
}

impl ResearchState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Returns the source's index, appending it to the registry on first sight of `url`.
    pub fn register_source(&mut self, url: &str, title: &str, query: &str) -> usize {
        if let Some(&index) = self.url_to_source_index.get(url) {
            return index;
        }
        let index = self.results.len();
        self.results.push(Source {
            url: url.to_string(),
            title: title.to_string(),
            query: query.to_string(),
        });
        self.url_to_source_index.insert(url.to_string(), index);
        index
    }

    pub fn is_registered(&self, url: &str) -> bool {
        self.url_to_source_index.contains_key(url)
    }

    /// Stores a chunk and its embedding unless identical text is already known.
    /// Returns whether the chunk was added.
    pub fn add_chunk(&mut self, text: &str, source_index: usize, embedding: Vec<f32>) -> bool {
        let hash = hash_text(text);
        if self.embedding_cache.contains_key(&hash) {
            return false;
        }
        self.chunks.push(Chunk {
            text: text.to_string(),
            source_index,
        });
        self.embedding_cache.insert(hash, embedding);
        true
    }

    pub fn embedding_for(&self, text: &str) -> Option<&Vec<f32>> {
        self.embedding_cache.get(&hash_text(text))
    }

    /// Chunks paired with their cached embedding, in insertion order.
    pub fn embedded_chunks(&self) -> Vec<(&Chunk, &Vec<f32>)> {
        self.chunks
            .iter()
            .filter_map(|chunk| self.embedding_for(&chunk.text).map(|emb| (chunk, emb)))
            .collect()
    }

    pub fn cached_embeddings(&self) -> Vec<Vec<f32>> {
        self.embedding_cache.values().cloned().collect()
    }

    /// Outline topics with non-empty text, in outline order.
    pub fn topic_texts(&self) -> Vec<String> {
        self.outline
            .iter()
            .map(|entry| entry.topic.trim())
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.outline.iter().any(|entry| entry.topic == topic)
    }

    /// Appends a new outline entry. Returns false for empty or duplicate topics.
    pub fn add_topic(&mut self, topic: &str, subtopics: Vec<String>) -> bool {
        let topic = topic.trim();
        if topic.is_empty() || self.has_topic(topic) {
            return false;
        }
        self.outline.push(OutlineEntry::new(topic, subtopics));
        true
    }

    /// Last `limit` distinct queries that produced sources, excluding reflexion searches.
    pub fn recent_queries(&self, limit: usize) -> Vec<String> {
        let mut distinct: Vec<String> = Vec::new();
        for source in &self.results {
            if source.query.contains("reflexion") || distinct.contains(&source.query) {
                continue;
            }
            distinct.push(source.query.clone());
        }
        let skip = distinct.len().saturating_sub(limit);
        distinct.into_iter().skip(skip).collect()
    }
}
