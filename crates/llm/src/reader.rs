//! Reassembly of newline-delimited JSON records into stream events

use crate::{ChatResponse, ChunkStream, StreamError, StreamEvent, ToolCall};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Pull-based decoder over a `ChunkStream`.
///
/// Bytes are buffered until a newline completes a record, so records and
/// multi-byte characters split across chunks decode correctly. Lines that are
/// not valid JSON are skipped. A record with `done: true` yields
/// `StreamEvent::Done` and ends the stream.
pub struct StreamReader {
    source: Box<dyn ChunkStream>,
    cancel: Option<CancellationToken>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl StreamReader {
    pub fn new(source: Box<dyn ChunkStream>) -> Self {
        Self {
            source,
            cancel: None,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Makes every pending read fail with `StreamError::Aborted` once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the next event, or `None` once the stream is exhausted
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event == StreamEvent::Done {
                    self.finished = true;
                    self.pending.clear();
                }
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.fetch_chunk().await? {
                Some(bytes) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_complete_lines()?;
                }
                None => {
                    self.finished = true;
                    let rest = std::mem::take(&mut self.buffer);
                    // Trailing record without a newline, parsed best-effort
                    self.decode_line(&rest)?;
                }
            }
        }
    }

    async fn fetch_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        match &self.cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(StreamError::Aborted("request cancelled".to_string()));
                }
                tokio::select! {
                    _ = token.cancelled() => Err(StreamError::Aborted("request cancelled".to_string())),
                    chunk = self.source.next_chunk() => chunk,
                }
            }
            None => self.source.next_chunk().await,
        }
    }

    fn drain_complete_lines(&mut self) -> Result<(), StreamError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line[..pos])?;
        }
        Ok(())
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<(), StreamError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }

        // Invalid bytes become U+FFFD instead of costing the whole record
        let text = String::from_utf8_lossy(line);
        let record: ChatResponse = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(e) => {
                trace!("Skipping malformed stream line: {}", e);
                return Ok(());
            }
        };

        if let Some(error) = record.error {
            debug!("Server reported error mid-stream: {}", error);
            return Err(StreamError::Server(error));
        }

        let (thinking, content, tool_calls) = match record.message {
            Some(message) => (message.thinking, message.content, message.tool_calls),
            None => (None, None, None),
        };

        if let Some(thinking) = thinking.filter(|t| !t.is_empty()) {
            self.pending.push_back(StreamEvent::ReasoningDelta(thinking));
        }
        // `message.content` wins, a bare `response` field is the fallback
        if let Some(content) = content
            .filter(|c| !c.is_empty())
            .or(record.response.filter(|r| !r.is_empty()))
        {
            self.pending.push_back(StreamEvent::ContentDelta(content));
        }
        if let Some(calls) = tool_calls.filter(|c| !c.is_empty()) {
            self.pending.push_back(StreamEvent::ToolCallDelta(
                calls.into_iter().map(ToolCall::from).collect(),
            ));
        }

        if record.done {
            self.pending.push_back(StreamEvent::Done);
        }
        Ok(())
    }
}
