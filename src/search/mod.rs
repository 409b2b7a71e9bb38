//! Web search capability.
//!
//! The pipeline only sees [`SearchProvider`]. Failures are reported through
//! [`SearchError`](crate::error::SearchError) and degraded by the caller.

mod tavily;

pub use tavily::TavilyClient;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SearchClientResult;
use crate::state::SearchResult;

/// Query a web search backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return at most `max_results` hits for `query`, honouring `timeout`.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> SearchClientResult<Vec<SearchResult>>;
}
