use crate::tools::core::{Tool, ToolSpec};
use crate::tools::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use web::SearchProvider;

// Input type for the web_search tool
#[derive(Deserialize)]
pub struct WebSearchInput {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebSearchEntry {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// Output type with ranked search results
#[derive(Debug, Serialize)]
pub struct WebSearchOutput {
    pub query: String,
    pub results_count: usize,
    pub results: Vec<WebSearchEntry>,
}

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    type Input = WebSearchInput;
    type Output = WebSearchOutput;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search",
            description: "Search the internet for real-time information, news, or specific data not present in your training data.",
            parameters_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ToolError> {
        let query = input
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or(ToolError::MissingParameter("Query"))?;

        let hits = self
            .provider
            .search(&query)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        debug!("web_search '{}' returned {} hits", query, hits.len());

        if hits.is_empty() {
            return Err(ToolError::NoResults { query });
        }

        let results: Vec<WebSearchEntry> = hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| WebSearchEntry {
                index: i + 1,
                title: hit.title,
                url: hit.href,
                snippet: hit.body,
            })
            .collect();

        Ok(WebSearchOutput {
            query,
            results_count: results.len(),
            results,
        })
    }
}
