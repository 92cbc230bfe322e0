use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub session_id: String,
    pub query: String,
    pub report: String,
    pub total_time_ms: u64,
    pub task_times: HashMap<String, u64>,
    pub generated_at: DateTime<Utc>,
}

/// One report topic and the subtopics the section should touch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub topic: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
}

impl OutlineEntry {
    pub fn new(topic: impl Into<String>, subtopics: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            subtopics,
        }
    }

    /// "topic: sub1, sub2", the phrase used to focus retrieval for a section.
    pub fn focus_query(&self) -> String {
        if self.subtopics.is_empty() {
            self.topic.clone()
        } else {
            format!("{}: {}", self.topic, self.subtopics.join(", "))
        }
    }
}

/// A registered web source. Its position in the registry is its citation number minus one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A web search the Actor should run, scored against `target_outline_topic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAction {
    pub query: String,
    pub target_outline_topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    Search {
        query: String,
        target_outline_topic: Option<String>,
    },
    AddToOutline {
        topic: String,
        #[serde(default)]
        subtopics: Vec<String>,
    },
}

/// The Planner's decision for one cycle.
///
/// `complete` is set when the planner returned no plan list or an empty one.
/// A non-empty list whose entries were all malformed leaves `actions` empty
/// without ending research.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub critique: String,
    pub thought: String,
    pub actions: Vec<PlanAction>,
    #[serde(default)]
    pub complete: bool,
}

impl Plan {
    pub fn complete(critique: impl Into<String>, thought: impl Into<String>) -> Self {
        Self {
            critique: critique.into(),
            thought: thought.into(),
            actions: Vec::new(),
            complete: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn search_actions(&self) -> Vec<SearchAction> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                PlanAction::Search {
                    query,
                    target_outline_topic,
                } => Some(SearchAction {
                    query: query.clone(),
                    target_outline_topic: target_outline_topic.clone(),
                }),
                PlanAction::AddToOutline { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilySearchRequest {
    pub query: String,
    pub max_results: usize,
    pub search_depth: String,
    pub include_raw_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilySearchResponse {
    pub results: Vec<TavilyResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearxResponse {
    #[serde(default)]
    pub results: Vec<SearxResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearxResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}
