use crate::memory::MemoryStore;
use crate::ui::{UIError, UiEvent, UserInterface};
use anyhow::Result;
use async_trait::async_trait;
use llm::{
    ChatRequest, ChatResponse, ChatTransport, ChunkStream, ResponseMessage, ScriptedChunkStream,
    StreamError,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use web::{SearchHit, SearchProvider};

/// One scripted answer of the mock transport
pub enum MockReply {
    /// Raw body chunks, delivered as-is
    Chunks(Vec<String>),
    /// Chunks delivered slowly so the caller can cancel in between
    SlowChunks(Vec<String>, Duration),
    /// Failure before any chunk is produced
    Fail(StreamError),
}

/// NDJSON record carrying a content delta
pub fn content_line(text: &str) -> String {
    format!("{}\n", json!({"message": {"role": "assistant", "content": text}, "done": false}))
}

/// NDJSON record carrying reasoning in its own field
pub fn thinking_line(text: &str) -> String {
    format!(
        "{}\n",
        json!({"message": {"role": "assistant", "content": "", "thinking": text}, "done": false})
    )
}

/// NDJSON record requesting a web search, arguments given as an object
pub fn search_call_line(query: &str) -> String {
    format!(
        "{}\n",
        json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "web_search", "arguments": {"query": query}}}]
            },
            "done": false
        })
    )
}

/// NDJSON record requesting a web search with raw string arguments
pub fn raw_search_call_line(arguments: &str) -> String {
    format!(
        "{}\n",
        json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "web_search", "arguments": arguments}}]
            },
            "done": false
        })
    )
}

pub fn done_line() -> String {
    format!("{}\n", json!({"done": true}))
}

/// Full streamed answer consisting of `text` and a completion record
pub fn answer(text: &str) -> MockReply {
    MockReply::Chunks(vec![content_line(text), done_line()])
}

#[derive(Default, Clone)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    completions: Arc<Mutex<VecDeque<Result<String, StreamError>>>>,
    completion_delay: Option<Duration>,
}

impl MockTransport {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(replies.into())),
            completions: Arc::new(Mutex::new(VecDeque::new())),
            completion_delay: None,
        }
    }

    /// Scripts the text of non-streaming completions
    pub fn with_completions(self, completions: Vec<Result<String, StreamError>>) -> Self {
        *self.completions.lock().unwrap() = completions.into();
        self
    }

    /// Holds every non-streaming completion back for `delay`
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn streaming_requests(&self) -> Vec<ChatRequest> {
        self.requests().into_iter().filter(|r| r.stream).collect()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<Box<dyn ChunkStream>, StreamError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Chunks(chunks)) => Ok(Box::new(ScriptedChunkStream::new(chunks))),
            Some(MockReply::SlowChunks(chunks, delay)) => {
                Ok(Box::new(ScriptedChunkStream::new(chunks).with_delay(delay)))
            }
            Some(MockReply::Fail(error)) => Err(error),
            None => Err(StreamError::Network("no scripted reply left".to_string())),
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StreamError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.completion_delay {
            tokio::time::sleep(delay).await;
        }
        let completion = self.completions.lock().unwrap().pop_front();
        match completion {
            Some(Ok(text)) => Ok(ChatResponse {
                message: Some(ResponseMessage {
                    content: Some(text),
                    ..Default::default()
                }),
                done: true,
                ..Default::default()
            }),
            Some(Err(error)) => Err(error),
            None => Err(StreamError::Network("no scripted completion left".to_string())),
        }
    }
}

#[derive(Default, Clone)]
pub struct MockSearchProvider {
    results: Arc<Mutex<VecDeque<Result<Vec<SearchHit>, String>>>>,
    queries: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockSearchProvider {
    pub fn new(results: Vec<Result<Vec<SearchHit>, String>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            queries: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Answers every search only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(hits)) => Ok(hits),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

pub fn search_hit(title: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        href: format!("https://example.com/{}", title.to_lowercase()),
        body: format!("About {title}"),
    }
}

#[derive(Default, Clone)]
pub struct MockMemoryStore {
    remembered: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockMemoryStore {
    pub fn remembered(&self) -> Vec<(String, String)> {
        self.remembered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryStore for MockMemoryStore {
    async fn remember(&self, content: &str, category: &str) -> Result<()> {
        self.remembered
            .lock()
            .unwrap()
            .push((content.to_string(), category.to_string()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MockUI {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl MockUI {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserInterface for MockUI {
    async fn send_event(&self, event: UiEvent) -> Result<(), UIError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
