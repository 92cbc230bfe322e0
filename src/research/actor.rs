use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::analyst::Analyst;
use crate::config::Settings;
use crate::models::{SearchAction, SearchHit};
use crate::state::SharedState;
use crate::text::{cosine_similarity, max_similarity, sentence_chunks};
use crate::tools::Services;

/// What one batch of search actions added to the knowledge store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActReport {
    /// Titles of the sources newly registered for each query.
    pub sources_by_query: BTreeMap<String, Vec<String>>,
    pub new_chunks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub score: f32,
    pub text: String,
    pub source_index: usize,
    pub embedding: Vec<f32>,
}

/// `alpha * utility - (1 - alpha) * redundancy`
pub fn novelty_score(utility: f32, redundancy: f32, alpha: f32) -> f32 {
    alpha * utility - (1.0 - alpha) * redundancy
}

/// Highest-scoring `k` chunks, best first.
pub fn select_top_k(mut chunks: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
    chunks.truncate(k);
    chunks
}

/// Executes search actions: search, fetch, chunk, embed, score, commit.
pub struct Actor {
    state: SharedState,
    services: Services,
    settings: Arc<Settings>,
    analyst: Arc<Analyst>,
}

impl Actor {
    pub fn new(
        state: SharedState,
        services: Services,
        settings: Arc<Settings>,
        analyst: Arc<Analyst>,
    ) -> Self {
        Self {
            state,
            services,
            settings,
            analyst,
        }
    }

    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    pub async fn act(&self, actions: &[SearchAction]) -> ActReport {
        let mut report = ActReport::default();
        if actions.is_empty() {
            return report;
        }

        let mut topics: Vec<String> = Vec::new();
        for topic in actions.iter().filter_map(|a| a.target_outline_topic.as_ref()) {
            if !topic.trim().is_empty() && !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        info!("Generating HyDE documents for {} target topics", topics.len());
        let utility_by_topic: HashMap<String, Vec<f32>> = topics
            .iter()
            .cloned()
            .zip(self.analyst.topic_embeddings(&topics).await)
            .filter_map(|(topic, embedding)| embedding.map(|e| (topic, e)))
            .collect();

        let (query_embedding, known_embeddings) = {
            let state = self.state.read().await;
            (state.query_embedding.clone(), state.cached_embeddings())
        };

        let batches = actions.iter().map(|action| {
            let reference = action
                .target_outline_topic
                .as_ref()
                .and_then(|topic| utility_by_topic.get(topic))
                .or(query_embedding.as_ref());
            let known = &known_embeddings;
            async move {
                let Some(reference) = reference else {
                    warn!(
                        "No utility embedding for query '{}'. Skipping action.",
                        action.query
                    );
                    return (action.query.clone(), Vec::new(), Vec::new());
                };
                self.run_action(action, reference, known).await
            }
        });

        let mut candidates = Vec::new();
        for (query, titles, scored) in join_all(batches).await {
            if !titles.is_empty() {
                report
                    .sources_by_query
                    .entry(query)
                    .or_default()
                    .extend(titles);
            }
            candidates.extend(scored);
        }

        let candidate_count = candidates.len();
        let winners = select_top_k(candidates, self.settings.novelty_top_k);

        let mut state = self.state.write().await;
        for chunk in winners {
            if state.add_chunk(&chunk.text, chunk.source_index, chunk.embedding) {
                report.new_chunks += 1;
            }
        }
        info!(
            "Added {} new chunks to knowledge base (out of {} candidates).",
            report.new_chunks, candidate_count
        );
        report
    }

    /// Returns the query, titles of newly registered sources and the scored chunks.
    async fn run_action(
        &self,
        action: &SearchAction,
        reference: &[f32],
        known: &[Vec<f32>],
    ) -> (String, Vec<String>, Vec<ScoredChunk>) {
        let query = action.query.clone();
        let hits = self
            .services
            .search
            .search(&query, self.settings.search_results)
            .await;
        let new_hits = self.unregistered(hits).await;
        if new_hits.is_empty() {
            debug!("No new URLs for query '{}'", query);
            return (query, Vec::new(), Vec::new());
        }

        let pages = join_all(new_hits.iter().map(|hit| self.services.fetcher.fetch(&hit.url))).await;

        let mut titles = Vec::new();
        let mut pending: Vec<(String, usize)> = Vec::new();
        {
            let mut state = self.state.write().await;
            for (hit, content) in new_hits.iter().zip(pages) {
                // Another action in the batch may have registered it meanwhile.
                if state.is_registered(&hit.url) {
                    continue;
                }
                if content.chars().count() <= self.settings.min_page_chars {
                    debug!("Dropping {}: no usable content", hit.url);
                    continue;
                }
                let title = if hit.title.trim().is_empty() {
                    "Untitled"
                } else {
                    hit.title.as_str()
                };
                let index = state.register_source(&hit.url, title, &query);
                titles.push(title.to_string());
                pending.extend(
                    sentence_chunks(&content, self.settings.chunk_sentences)
                        .into_iter()
                        .map(|text| (text, index)),
                );
            }
        }

        let texts: Vec<String> = pending.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = self.analyst.embed_texts(&texts).await;

        let alpha = self.settings.novelty_alpha;
        let scored = pending
            .into_iter()
            .zip(embeddings)
            .filter_map(|((text, source_index), embedding)| {
                let embedding = embedding?;
                let utility = cosine_similarity(reference, &embedding);
                let redundancy = max_similarity(&embedding, known);
                Some(ScoredChunk {
                    score: novelty_score(utility, redundancy, alpha),
                    text,
                    source_index,
                    embedding,
                })
            })
            .collect();

        (query, titles, scored)
    }

    /// Drops hits whose URL is empty, already registered, or repeated in the list.
    async fn unregistered(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        hits.into_iter()
            .filter(|hit| {
                !hit.url.is_empty() && !state.is_registered(&hit.url) && seen.insert(hit.url.clone())
            })
            .collect()
    }
}
