//! Coverage, information gain and latent topic discovery over the knowledge store.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clustering;
use crate::config::Settings;
use crate::prompts;
use crate::state::{ResearchState, SharedState};
use crate::text::{euclidean_distance, hash_text, max_similarity, truncate_chars};
use crate::tools::{CompletionRequest, Services};

/// Per-topic coverage scores. `vector` is `None` when coverage cannot be computed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub vector: Option<Vec<f32>>,
    pub summary: String,
}

impl Coverage {
    fn unavailable(reason: &str) -> Self {
        Self {
            vector: None,
            summary: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatentTopic {
    pub id: usize,
    pub label: String,
}

pub struct Analyst {
    state: SharedState,
    services: Services,
    settings: Arc<Settings>,
    topic_embeddings: DashMap<String, Vec<f32>>,
}

impl Analyst {
    pub fn new(state: SharedState, services: Services, settings: Arc<Settings>) -> Self {
        Self {
            state,
            services,
            settings,
            topic_embeddings: DashMap::new(),
        }
    }

    /// Writes a short passage answering `topic` (HyDE). Falls back to the topic itself.
    pub async fn hyde_document(&self, topic: &str) -> String {
        debug!("Generating HyDE document for topic: '{}'", topic);
        let request = CompletionRequest::new(prompts::HYDE_GENERATOR, topic)
            .temperature(0.4)
            .max_tokens(512);

        match self.services.reasoning.complete(request).await {
            Ok(doc) if !doc.trim().is_empty() => doc,
            Ok(_) | Err(_) => {
                warn!(
                    "Could not generate HyDE document for '{}'. Using topic string as fallback.",
                    topic
                );
                topic.to_string()
            }
        }
    }

    /// Embeds `texts`, consulting the session cache and the shared cache first.
    ///
    /// Misses are sent in concurrent batches. The result has one slot per input.
    pub async fn embed_texts(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<(usize, String)> = Vec::new();

        {
            let state = self.state.read().await;
            for (i, text) in texts.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let hash = hash_text(text);
                let cached = state
                    .embedding_cache
                    .get(&hash)
                    .cloned()
                    .or_else(|| self.services.embed_cache.get(&hash));
                match cached {
                    Some(embedding) => embeddings[i] = Some(embedding),
                    None => missing.push((i, text.clone())),
                }
            }
        }

        if missing.is_empty() {
            return embeddings;
        }

        let batch_size = self.settings.embedding_batch_size.max(1);
        let requests = missing.chunks(batch_size).map(|batch| {
            let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            async move { self.services.embeddings.embed_batch(&inputs).await }
        });
        let responses = join_all(requests).await;

        for (batch, response) in missing.chunks(batch_size).zip(responses) {
            for ((index, text), embedding) in batch.iter().zip(response) {
                if let Some(embedding) = embedding {
                    self.services.embed_cache.put(hash_text(text), embedding.clone());
                    embeddings[*index] = Some(embedding);
                }
            }
        }
        embeddings
    }

    /// The HyDE embedding for `topic`, generated once and reused afterwards.
    pub async fn topic_embedding(&self, topic: &str) -> Option<Vec<f32>> {
        if let Some(cached) = self.topic_embeddings.get(topic) {
            return Some(cached.clone());
        }
        let document = self.hyde_document(topic).await;
        let embedding = self.embed_texts(&[document]).await.pop().flatten()?;
        self.topic_embeddings
            .insert(topic.to_string(), embedding.clone());
        Some(embedding)
    }

    pub async fn topic_embeddings(&self, topics: &[String]) -> Vec<Option<Vec<f32>>> {
        join_all(topics.iter().map(|topic| self.topic_embedding(topic))).await
    }

    /// Best match between each outline topic and the knowledge store.
    ///
    /// The vector has one entry per non-empty outline topic; topics whose
    /// HyDE embedding failed score 0.0.
    pub async fn calculate_topic_coverage(&self) -> Coverage {
        let (topics, has_outline, has_chunks) = {
            let state = self.state.read().await;
            (
                state.topic_texts(),
                !state.outline.is_empty(),
                !state.chunks.is_empty(),
            )
        };
        if !has_outline || !has_chunks {
            return Coverage::unavailable("Not enough data for coverage analysis.");
        }
        if topics.is_empty() {
            return Coverage::unavailable("Outline is malformed or empty (no topic strings).");
        }

        let topic_embeddings = self.topic_embeddings(&topics).await;
        if topic_embeddings.iter().all(Option::is_none) {
            return Coverage::unavailable("Could not embed outline topics.");
        }

        let cached = self.state.read().await.cached_embeddings();
        if cached.is_empty() {
            return Coverage::unavailable("No valid chunk embeddings in cache for coverage.");
        }

        let vector: Vec<f32> = topic_embeddings
            .iter()
            .map(|embedding| {
                embedding
                    .as_ref()
                    .map_or(0.0, |e| max_similarity(e, &cached))
            })
            .collect();
        let summary = topics
            .iter()
            .zip(&vector)
            .map(|(topic, score)| format!("'{}': {:.2}", topic, score))
            .collect::<Vec<_>>()
            .join(", ");

        Coverage {
            vector: Some(vector),
            summary,
        }
    }

    #[instrument(skip(self))]
    pub async fn update_information_gain(&self) {
        debug!("Updating information gain...");
        let coverage = self.calculate_topic_coverage().await;
        let Some(vector) = coverage.vector else {
            debug!("Skipping gain update: {}", coverage.summary);
            return;
        };
        let mut state = self.state.write().await;
        record_coverage(&mut state, vector);
    }

    pub async fn check_diminishing_returns(&self) -> bool {
        let state = self.state.read().await;
        let stop = diminishing_returns(
            &state.information_gain_history,
            self.settings.diminishing_returns_window,
            self.settings.diminishing_returns_threshold,
        );
        if stop {
            warn!(
                "Average gain over the last {} cycles is below {}. Stopping.",
                self.settings.diminishing_returns_window, self.settings.diminishing_returns_threshold
            );
        }
        stop
    }

    pub async fn gain_trend_description(&self) -> String {
        let state = self.state.read().await;
        gain_trend(
            &state.information_gain_history,
            self.settings.diminishing_returns_threshold,
        )
        .to_string()
    }

    /// Clusters the chunk embeddings and asks for a short label per cluster.
    #[instrument(skip(self))]
    pub async fn latent_topics(&self) -> Vec<LatentTopic> {
        let n_clusters = self.settings.n_clusters;
        if n_clusters == 0 {
            return Vec::new();
        }
        let (texts, embeddings): (Vec<String>, Vec<Vec<f32>>) = {
            let state = self.state.read().await;
            if state.embedding_cache.len() < n_clusters {
                return Vec::new();
            }
            state
                .embedded_chunks()
                .into_iter()
                .map(|(chunk, embedding)| (chunk.text.clone(), embedding.clone()))
                .unzip()
        };
        if embeddings.is_empty() || embeddings.len() < n_clusters {
            return Vec::new();
        }

        let n_features = embeddings[0].len();
        let n_components = self
            .settings
            .pca_components
            .min(embeddings.len())
            .min(n_features);
        if n_components <= 1 {
            return Vec::new();
        }
        let reduced = clustering::pca(&embeddings, n_components);

        let k = n_clusters.min(reduced.len());
        if k <= 1 {
            return Vec::new();
        }
        let labels = clustering::kmeans(&reduced, k, self.settings.kmeans_seed);

        let requests = (0..k).filter_map(|cluster| {
            let members: Vec<&str> = labels
                .iter()
                .zip(&texts)
                .filter(|(label, _)| **label == cluster)
                .map(|(_, text)| text.as_str())
                .collect();
            if members.is_empty() {
                return None;
            }
            let sample = members.iter().take(5).copied().collect::<Vec<_>>().join("\n- ");
            let request = CompletionRequest::new(
                prompts::CLUSTER_LABELER,
                format!("Snippets:\n- {}", truncate_chars(&sample, 3000)),
            )
            .temperature(0.2)
            .max_tokens(16);
            Some(async move { (cluster, self.services.reasoning.complete(request).await) })
        });

        join_all(requests)
            .await
            .into_iter()
            .filter_map(|(id, label)| match label {
                Ok(label) if !label.trim().is_empty() => Some(LatentTopic {
                    id,
                    label: label.trim().trim_matches('"').to_string(),
                }),
                Ok(_) => None,
                Err(e) => {
                    debug!("Dropping cluster {} label: {}", id, e);
                    None
                }
            })
            .collect()
    }

    /// Labels whose embedding is not close to any outline topic's HyDE embedding.
    pub async fn novel_labels(&self, labels: &[String], topics: &[String]) -> Vec<String> {
        let label_embeddings = self.embed_texts(labels).await;
        let topic_embeddings: Vec<Vec<f32>> = self
            .topic_embeddings(topics)
            .await
            .into_iter()
            .flatten()
            .collect();
        if topic_embeddings.is_empty() {
            return Vec::new();
        }

        labels
            .iter()
            .zip(label_embeddings)
            .filter_map(|(label, embedding)| {
                let embedding = embedding?;
                let closest = max_similarity(&embedding, &topic_embeddings);
                (closest < self.settings.latent_novelty_threshold).then(|| label.clone())
            })
            .collect()
    }

    /// Planner-facing description of candidate outline additions.
    pub async fn novel_latent_topics(&self) -> String {
        if !self.settings.enable_exploration {
            return "Not run.".to_string();
        }
        info!("Exploration enabled. Discovering latent topics...");

        let latent = self.latent_topics().await;
        if latent.is_empty() {
            return "Not enough data to discover latent topics.".to_string();
        }
        let labels: Vec<String> = latent.into_iter().map(|topic| topic.label).collect();
        let topics = self.state.read().await.topic_texts();
        if topics.is_empty() {
            return format!(
                "Found {} initial topics: {}",
                labels.len(),
                labels.join(", ")
            );
        }

        let novel = self.novel_labels(&labels, &topics).await;
        if novel.is_empty() {
            "No new latent topics discovered; existing topics seem to cover the data well."
                .to_string()
        } else {
            info!("Discovered novel latent topics: {:?}", novel);
            format!(
                "Found {} potentially new topics: {}",
                novel.len(),
                novel.join(", ")
            )
        }
    }
}

/// Records `vector` as the latest coverage and appends the information gain.
///
/// A change in dimension (the outline grew) resets the history to a single
/// high-gain sample instead of comparing. Returns the gain appended, if any.
pub fn record_coverage(state: &mut ResearchState, vector: Vec<f32>) -> Option<f32> {
    let mut gain = None;
    if let Some(previous) = &state.last_coverage_vector {
        if previous.len() == vector.len() {
            let distance = euclidean_distance(previous, &vector);
            state.information_gain_history.push(distance);
            info!("Information gain this cycle: {:.4}", distance);
            gain = Some(distance);
        } else {
            info!("Outline has changed shape. Resetting information gain history.");
            state.information_gain_history = vec![1.0];
        }
    }
    state.last_coverage_vector = Some(vector);
    gain
}

pub fn diminishing_returns(history: &[f32], window: usize, threshold: f32) -> bool {
    let window = window.max(1);
    if history.len() < window {
        return false;
    }
    let recent = &history[history.len() - window..];
    mean(recent) < threshold
}

pub fn gain_trend(history: &[f32], threshold: f32) -> &'static str {
    if history.len() < 2 {
        return "Just starting.";
    }
    let recent = &history[history.len().saturating_sub(3)..];
    if mean(recent) < threshold {
        return "Stalling (very low gain).";
    }
    let last = recent[recent.len() - 1];
    let previous = recent[recent.len() - 2];
    if last > previous {
        "Increasing."
    } else if last < previous * 0.75 {
        "Decreasing."
    } else {
        "Stable."
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diminishing_returns_needs_a_full_window() {
        assert!(!diminishing_returns(&[], 2, 0.005));
        assert!(!diminishing_returns(&[0.0], 2, 0.005));
        assert!(diminishing_returns(&[0.001, 0.002], 2, 0.005));
        assert!(!diminishing_returns(&[0.001, 0.5], 2, 0.005));
    }

    #[test]
    fn diminishing_returns_only_looks_at_recent_gains() {
        assert!(diminishing_returns(&[0.9, 0.8, 0.001, 0.001], 2, 0.005));
    }

    #[test]
    fn trend_labels() {
        assert_eq!(gain_trend(&[0.3], 0.005), "Just starting.");
        assert_eq!(gain_trend(&[0.001, 0.001, 0.002], 0.005), "Stalling (very low gain).");
        assert_eq!(gain_trend(&[0.1, 0.2], 0.005), "Increasing.");
        assert_eq!(gain_trend(&[0.2, 0.1], 0.005), "Decreasing.");
        // Within the 25% band.
        assert_eq!(gain_trend(&[0.2, 0.16], 0.005), "Stable.");
    }

    #[test]
    fn first_coverage_sets_baseline_without_gain() {
        let mut state = ResearchState::new("q");
        assert_eq!(record_coverage(&mut state, vec![0.1, 0.2]), None);
        assert!(state.information_gain_history.is_empty());
        assert_eq!(state.last_coverage_vector, Some(vec![0.1, 0.2]));
    }

    #[test]
    fn gain_is_euclidean_distance_between_cycles() {
        let mut state = ResearchState::new("q");
        record_coverage(&mut state, vec![0.0, 0.0]);
        let gain = record_coverage(&mut state, vec![0.3, 0.4]).unwrap();
        assert!((gain - 0.5).abs() < 1e-6);
        assert_eq!(state.information_gain_history.len(), 1);
    }

    #[test]
    fn outline_growth_resets_gain_history() {
        let mut state = ResearchState::new("q");
        state.information_gain_history = vec![0.2, 0.1, 0.05];
        state.last_coverage_vector = Some(vec![0.5, 0.5]);

        assert_eq!(record_coverage(&mut state, vec![0.5, 0.5, 0.1]), None);
        assert_eq!(state.information_gain_history, vec![1.0]);
        assert_eq!(state.last_coverage_vector.as_ref().map(Vec::len), Some(3));
    }
}
