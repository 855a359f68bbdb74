//! Client for the companion server's retrieval memory (`/api/rag/*`)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Retrieved memories, preformatted as a system message
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub message: String,
    pub hits: usize,
}

/// Supplies context for a user query before the conversation history
#[async_trait]
pub trait RetrievalContext: Send + Sync {
    async fn context_for(&self, query: &str) -> Result<Option<RetrievedContext>>;
}

/// Accepts facts worth remembering across conversations
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn remember(&self, content: &str, category: &str) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MemoryHit {
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<MemoryHit>,
}

pub struct RagClient {
    http_client: Client,
    base_url: String,
    limit: usize,
    threshold: f32,
}

impl RagClient {
    pub fn new(base_url: impl Into<String>, limit: usize, threshold: f32) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limit,
            threshold,
        }
    }

    pub async fn query(&self, query: &str) -> Result<Vec<MemoryHit>> {
        let response = self
            .http_client
            .post(format!("{}/api/rag/query", self.base_url))
            .json(&json!({
                "query": query,
                "limit": self.limit,
                "threshold": self.threshold,
            }))
            .send()
            .await
            .context("Memory query failed")?
            .error_for_status()?;
        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.results)
    }
}

pub fn format_memories(hits: &[MemoryHit]) -> String {
    let memories = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Memory {}] (relevance: {:.0}%)\n{}",
                i + 1,
                hit.score * 100.0,
                hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "[System note: the following related memories were retrieved; prefer them when answering]\n{memories}\n[End of memories]\n"
    )
}

#[async_trait]
impl RetrievalContext for RagClient {
    async fn context_for(&self, query: &str) -> Result<Option<RetrievedContext>> {
        let hits = self.query(query).await?;
        debug!("Retrieved {} memories", hits.len());
        if hits.is_empty() {
            return Ok(None);
        }
        Ok(Some(RetrievedContext {
            message: format_memories(&hits),
            hits: hits.len(),
        }))
    }
}

#[async_trait]
impl MemoryStore for RagClient {
    async fn remember(&self, content: &str, category: &str) -> Result<()> {
        self.http_client
            .post(format!("{}/api/rag/add", self.base_url))
            .json(&json!({ "content": content, "category": category }))
            .send()
            .await
            .context("Saving memory failed")?
            .error_for_status()?;
        debug!("Saved memory ({}): {}", category, content);
        Ok(())
    }
}
