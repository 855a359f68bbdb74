use crate::{SearchHit, SearchProvider};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a companion service exposing `POST /api/tools/web_search`
pub struct SearchServiceClient {
    http_client: Client,
    base_url: String,
}

impl SearchServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for SearchServiceClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let endpoint = format!("{}/api/tools/web_search", self.base_url);
        debug!("Searching via {}: {}", endpoint, query);

        let response = self
            .http_client
            .post(endpoint)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Search failed: {} {}",
                status.as_u16(),
                error_text
            ));
        }

        let parsed: ServiceResponse = response.json().await?;
        match parsed.error {
            Some(error) => Err(anyhow::anyhow!(error)),
            None => Ok(parsed.results),
        }
    }
}
