use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::SearchProvider;
use crate::config::SearchConfig;
use crate::error::{SearchClientResult, SearchError};
use crate::state::SearchResult;

/// Request body for `POST /search`
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl From<TavilyHit> for SearchResult {
    fn from(hit: TavilyHit) -> Self {
        // Raw page text is richer than the snippet when the API returns it.
        let content = match hit.raw_content {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => hit.content,
        };
        SearchResult {
            url: hit.url,
            title: hit.title,
            content,
            relevance_score: hit.score,
        }
    }
}

/// Client for the Tavily search API
#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TavilyClient {
    /// Create a new Tavily client
    pub fn new(config: &SearchConfig) -> SearchClientResult<Self> {
        let client = Client::builder().build().map_err(SearchError::Http)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> SearchClientResult<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            include_raw_content: true,
        };

        debug!(query = %query, max_results, "Calling search API");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    SearchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Search API returned an error");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TavilyResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        let results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .take(max_results)
            .map(SearchResult::from)
            .collect();

        info!(
            query = %query,
            results = results.len(),
            latency_ms = start.elapsed().as_millis(),
            "Search completed"
        );

        Ok(results)
    }
}
