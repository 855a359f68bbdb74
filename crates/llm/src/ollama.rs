use crate::{
    ChatRequest, ChatResponse, ChatTransport, ChunkStream, HttpChunkStream, ModelInfo, StreamError,
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};

/// Longest slice of a non-JSON error body quoted in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn default_base_url() -> String {
        "http://127.0.0.1:11434".to_string()
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Lists installed models that can chat, skipping embedding models
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Network error: {}", e))?;
        let response = Self::check_status(response).await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags
            .models
            .into_iter()
            .filter(ModelInfo::is_chat_model)
            .collect())
    }

    async fn send(&self, request: &ChatRequest) -> Result<Response, StreamError> {
        debug!(
            "Sending chat request: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len)
        );
        let response = self
            .client
            .post(self.chat_url())
            .json(request)
            .send()
            .await
            .map_err(StreamError::from_reqwest)?;
        Self::check_status(response).await
    }

    /// Turns non-success responses into `StreamError::Status`
    async fn check_status(response: Response) -> Result<Response, StreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = error_message(&body);
        warn!("Server answered {}: {}", status, message);
        Err(StreamError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Prefers the `error` field of a JSON body, else a prefix of the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

#[async_trait]
impl ChatTransport for OllamaClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<Box<dyn ChunkStream>, StreamError> {
        let response = self.send(request).await?;
        Ok(Box::new(HttpChunkStream::new(response)))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StreamError> {
        let response = self.send(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| StreamError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| StreamError::Decode(e.to_string()))
    }
}
