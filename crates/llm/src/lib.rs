//! Transport layer for talking to a local model server
//!
//! This crate implements:
//! - Wire types for the line-delimited chat protocol (requests, messages, tool declarations)
//! - The `ChunkStream` abstraction over raw response bodies (HTTP or scripted)
//! - `StreamReader`, which reassembles newline-delimited JSON records into `StreamEvent`s
//! - The `ChatTransport` trait and its Ollama implementation
//! - The transport error taxonomy shared by all callers


mod error;
pub mod ollama;
pub mod reader;
pub mod streaming;
pub mod types;

pub use error::StreamError;
pub use ollama::OllamaClient;
pub use reader::StreamReader;
pub use streaming::{ChunkStream, HttpChunkStream, ScriptedChunkStream};
pub use types::*;

use async_trait::async_trait;

/// Trait for model servers the chat client can talk to
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issues a streaming request and returns the raw body once the server accepted it.
    ///
    /// Non-success statuses fail here, before any chunk is produced.
    async fn open_stream(&self, request: &ChatRequest) -> Result<Box<dyn ChunkStream>, StreamError>;

    /// Issues a non-streaming request and returns the single decoded response
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, StreamError>;
}
