mod duckduckgo;
mod service;

pub use duckduckgo::DuckDuckGoClient;
pub use service::SearchServiceClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Number of hits requested from a search backend
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub body: String,
}

/// Anything that can answer a web search query.
///
/// An empty `Ok` means the backend was reachable but found nothing. Failures
/// carry a message meant to be shown to the model.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}
