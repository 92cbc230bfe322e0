use async_trait::async_trait;
use std::env;
use tracing::{debug, error};

use super::SearchClient;
use crate::error::ServiceError;
use crate::models::{SearchHit, SearxResponse, TavilySearchRequest, TavilySearchResponse};

/// Web search through the Tavily API.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    api_key: String,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("TAVILY_API_KEY")
            .map_err(|_| anyhow::anyhow!("TAVILY_API_KEY not set"))?;
        Ok(Self {
            api_key,
            client: reqwest::Client::new(),
        })
    }

    async fn request(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ServiceError> {
        let request = TavilySearchRequest {
            query: query.to_string(),
            max_results: limit,
            search_depth: "basic".to_string(),
            include_raw_content: false,
        };

        let response = self
            .client
            .post("https://api.tavily.com/search")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::Search(format!("Request failed: {}", e)))?;

        let search_response: TavilySearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Search(format!("Failed to parse response: {}", e)))?;

        Ok(search_response
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}

#[async_trait]
impl SearchClient for TavilySearch {
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        debug!("Sending Tavily search request for query: '{}'", query);
        match self.request(query, limit).await {
            Ok(hits) => {
                debug!("Tavily returned {} results", hits.len());
                hits
            }
            Err(e) => {
                error!("Tavily search failed for query '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}

/// Web search through a self-hosted SearxNG instance (`SEARX_URL`, JSON format enabled).
#[derive(Debug, Clone)]
pub struct SearxSearch {
    base_url: String,
    client: reqwest::Client,
}

impl SearxSearch {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ServiceError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json")])
            .timeout(std::time::Duration::from_secs(20))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::Search(format!("Request failed: {}", e)))?;

        let body: SearxResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Search(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}

#[async_trait]
impl SearchClient for SearxSearch {
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        debug!("Sending SearxNG search request for query: '{}'", query);
        match self.request(query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("SearxNG search failed for query '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}
