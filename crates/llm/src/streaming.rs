//! Chunk sources for streaming responses
//!
//! A `ChunkStream` hands out raw body bytes exactly as they arrive. Chunk
//! boundaries carry no meaning: records and even multi-byte characters may be
//! split across chunks, which `StreamReader` is responsible for reassembling.

use crate::StreamError;
use async_trait::async_trait;
use reqwest::Response;
use std::collections::VecDeque;
use std::time::Duration;

/// Trait for streaming chunk sources (live HTTP body or scripted chunks)
#[async_trait]
pub trait ChunkStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError>;
}

/// Live HTTP response body
pub struct HttpChunkStream {
    pub response: Response,
}

impl HttpChunkStream {
    pub fn new(response: Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => Ok(Some(chunk.to_vec())),
            Ok(None) => Ok(None),
            // A body that breaks off mid-stream is a lost connection
            Err(e) => Err(StreamError::Aborted(format!("HTTP chunk error: {e}"))),
        }
    }
}

/// Pre-scripted chunks, optionally paced, for tests and offline use
pub struct ScriptedChunkStream {
    chunks: VecDeque<Vec<u8>>,
    delay: Option<Duration>,
    trailing_error: Option<StreamError>,
}

impl ScriptedChunkStream {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            delay: None,
            trailing_error: None,
        }
    }

    /// Waits this long before handing out each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails with `error` once all chunks have been handed out
    pub fn with_trailing_error(mut self, error: StreamError) -> Self {
        self.trailing_error = Some(error);
        self
    }
}

#[async_trait]
impl ChunkStream for ScriptedChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None => match self.trailing_error.take() {
                Some(error) => Err(error),
                None => Ok(None),
            },
        }
    }
}
