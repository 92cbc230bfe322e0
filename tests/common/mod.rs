#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use deep_research::models::SearchHit;
use deep_research::prompts;
use deep_research::tools::{
    CompletionRequest, EmbeddingClient, PageFetcher, ReasoningClient, SearchClient,
};
use deep_research::{ServiceError, Services, Settings};

pub const OUTLINE: &str = r#"{"outline": [
  {"topic": "Early Experiments", "subtopics": ["Cooke and Wheatstone", "Electrochemical telegraphs"]},
  {"topic": "Morse Code", "subtopics": ["Samuel Morse", "Dots and dashes"]}
]}"#;

pub const PLAN_COMPLETE: &str = r#"{"critique": "Research deemed complete.", "thought": "All topics appear to be well-covered.", "plan": []}"#;

pub const REVIEW_APPROVE: &str = r#"{"critique": "Looks fine.", "action": "NONE"}"#;

/// Canned reasoning service. Dispatches on the system prompt; planner and
/// reviewer answers can be queued per test.
#[derive(Default)]
pub struct StubReasoner {
    pub planner_responses: Mutex<VecDeque<String>>,
    pub review_responses: Mutex<VecDeque<String>>,
    pub fail_rewrites: bool,
    pub calls: Mutex<Vec<CompletionRequest>>,
}

impl StubReasoner {
    pub fn with_plans(plans: &[&str]) -> Self {
        let stub = Self::default();
        stub.planner_responses
            .lock()
            .unwrap()
            .extend(plans.iter().map(|p| p.to_string()));
        stub
    }

    pub fn queue_reviews(&self, reviews: &[&str]) {
        self.review_responses
            .lock()
            .unwrap()
            .extend(reviews.iter().map(|r| r.to_string()));
    }

    pub fn calls_with_system(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.system == system)
            .count()
    }
}

#[async_trait]
impl ReasoningClient for StubReasoner {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(request.clone());
        let system = request.system.as_str();

        let response = if system.starts_with("You are a research expert. Generate") {
            r#"["telegraph invention", "morse code history", "undersea telegraph cables"]"#
                .to_string()
        } else if system == prompts::OUTLINE_DRAFTER {
            OUTLINE.to_string()
        } else if system == prompts::PLANNER_CRITIC {
            self.planner_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| PLAN_COMPLETE.to_string())
        } else if system == prompts::AGENT_SUMMARY {
            "The agent is searching for more sources.".to_string()
        } else if system == prompts::HYDE_GENERATOR {
            format!("Background on {}", request.user)
        } else if system == prompts::CLUSTER_LABELER {
            "Telegraph Networks".to_string()
        } else if system == prompts::REPORT_TITLE {
            "The Electric Telegraph".to_string()
        } else if system == prompts::REPORT_ABSTRACT {
            "This report surveys the rise of the electric telegraph.".to_string()
        } else if system == prompts::SECTION_SYNTHESIZER {
            let marker = Regex::new(r"\[Source (\d+)\]").unwrap();
            let n = marker
                .captures(&request.user)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| "1".to_string());
            format!(
                "The telegraph transformed long-distance communication [Source {}].\n\nReferences:\n1. Made up book",
                n
            )
        } else if system == prompts::REFLEXION_REVIEWER {
            self.review_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| REVIEW_APPROVE.to_string())
        } else if system == prompts::REFLEXION_REWRITER {
            let marker = Regex::new(r"\[Source (\d+)\]").unwrap();
            if self.fail_rewrites {
                return Err(ServiceError::Reasoning("rewrite timed out".to_string()));
            }
            let newest = marker
                .captures_iter(&request.user)
                .filter_map(|caps| caps[1].parse::<usize>().ok())
                .max()
                .unwrap_or(1);
            format!("Revised: operators relayed news within minutes [Source {}].", newest)
        } else {
            return Err(ServiceError::Reasoning(format!("unexpected prompt: {}", system)));
        };
        Ok(response)
    }
}

/// Reasoning service that always fails.
pub struct FailingReasoner;

#[async_trait]
impl ReasoningClient for FailingReasoner {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, ServiceError> {
        Err(ServiceError::Reasoning("service unavailable".to_string()))
    }
}

pub const EMBED_DIM: usize = 64;

/// Bag-of-words hashing embedder: texts sharing words point in similar directions.
#[derive(Default)]
pub struct StubEmbedder {
    pub fail: bool,
    pub requests: AtomicUsize,
    pub texts_embedded: AtomicUsize,
}

impl StubEmbedder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBED_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % EMBED_DIM;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        texts
            .iter()
            .map(|t| (!self.fail).then(|| Self::embed(t)))
            .collect()
    }
}

/// Two hits per query, with URLs derived from the query text.
#[derive(Default)]
pub struct StubSearch {
    pub calls: AtomicUsize,
}

pub fn slug(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl SearchClient for StubSearch {
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (0..limit.min(2))
            .map(|i| SearchHit {
                title: format!("{} result {}", query, i),
                url: format!("https://example.com/{}/{}", slug(query), i),
                snippet: String::new(),
            })
            .collect()
    }
}

/// Canned pages. URLs under `/short` return too little text to keep.
pub struct StubFetcher;

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> String {
        if url.contains("/short") {
            return "Too short.".to_string();
        }
        format!(
            "This page covers {}. The electric telegraph was developed in the 1830s. \
             Samuel Morse created a code of dots and dashes. \
             Undersea cables linked continents by 1866. \
             Operators could send messages across the world in minutes.",
            url
        )
    }
}

pub struct Harness {
    pub reasoner: Arc<StubReasoner>,
    pub embedder: Arc<StubEmbedder>,
    pub search: Arc<StubSearch>,
    pub services: Services,
}

impl Harness {
    pub fn new(reasoner: StubReasoner) -> Self {
        Self::with_embedder(reasoner, StubEmbedder::default())
    }

    pub fn with_embedder(reasoner: StubReasoner, embedder: StubEmbedder) -> Self {
        Self::with_settings(reasoner, embedder, &test_settings())
    }

    pub fn with_settings(reasoner: StubReasoner, embedder: StubEmbedder, settings: &Settings) -> Self {
        let reasoner = Arc::new(reasoner);
        let embedder = Arc::new(embedder);
        let search = Arc::new(StubSearch::default());
        let services = Services::new(
            reasoner.clone(),
            embedder.clone(),
            search.clone(),
            Arc::new(StubFetcher),
            settings,
        );
        Self {
            reasoner,
            embedder,
            search,
            services,
        }
    }
}

pub fn test_settings() -> Settings {
    Settings {
        enable_exploration: false,
        ..Settings::default()
    }
}

/// Citation numbers in `text`, in order of appearance.
pub fn citations(text: &str) -> Vec<usize> {
    Regex::new(r"\[(\d+)\]")
        .unwrap()
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}
