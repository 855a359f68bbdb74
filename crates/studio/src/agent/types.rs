use crate::persistence::Attachment;
use llm::ToolCall;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "[model returned no content]";

const REASONING_OPEN: &str = "<think>";
const REASONING_CLOSE: &str = "</think>";

/// One assistant response within a submission
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: u64,
    /// Append-only while the turn streams
    pub accumulated_text: String,
    pub tool_calls: Vec<ToolCall>,
    native_reasoning_open: bool,
    content_started: bool,
}

impl Turn {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            accumulated_text: String::new(),
            tool_calls: Vec::new(),
            native_reasoning_open: false,
            content_started: false,
        }
    }

    pub fn push_content(&mut self, delta: &str) {
        self.close_reasoning();
        if !delta.is_empty() {
            self.content_started = true;
        }
        self.accumulated_text.push_str(delta);
    }

    /// Folds reasoning reported in its own field into the text as a delimited block.
    ///
    /// Only reasoning that precedes the answer is kept; a block is never reopened.
    pub fn push_reasoning(&mut self, delta: &str) {
        if self.content_started {
            trace!("Dropping reasoning delta received after content: {delta:?}");
            return;
        }
        if !self.native_reasoning_open {
            self.accumulated_text.push_str(REASONING_OPEN);
            self.native_reasoning_open = true;
        }
        self.accumulated_text.push_str(delta);
    }

    pub fn close_reasoning(&mut self) {
        if self.native_reasoning_open {
            self.accumulated_text.push_str(REASONING_CLOSE);
            self.native_reasoning_open = false;
        }
    }

    /// Completes the turn once the stream ended normally
    pub fn finish(&mut self) {
        self.close_reasoning();
        if self.accumulated_text.trim().is_empty() && self.tool_calls.is_empty() {
            self.accumulated_text = EMPTY_RESPONSE_PLACEHOLDER.to_string();
        }
    }
}

/// Signatures of tool calls already executed during one submission
#[derive(Debug, Default)]
pub struct DedupSet {
    signatures: HashSet<String>,
}

impl DedupSet {
    /// Records `call`, returning false if an equal call was seen before
    pub fn insert(&mut self, call: &ToolCall) -> bool {
        self.signatures.insert(call.signature())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }
}

/// What the session has learned about models, kept for the process lifetime
#[derive(Debug, Default, Clone)]
pub struct SessionCapabilities {
    supports_tools: HashMap<String, bool>,
}

impl SessionCapabilities {
    /// Unknown models may be offered tools until they reject them
    pub fn may_offer_tools(&self, model: &str) -> bool {
        self.supports_tools.get(model) != Some(&false)
    }

    #[cfg(test)]
    pub fn supports_tools(&self, model: &str) -> Option<bool> {
        self.supports_tools.get(model).copied()
    }

    pub fn mark_tools_supported(&mut self, model: &str) {
        self.supports_tools.insert(model.to_string(), true);
    }

    pub fn mark_tools_unsupported(&mut self, model: &str) {
        self.supports_tools.insert(model.to_string(), false);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorState {
    Idle,
    AwaitingFirstToken,
    Streaming,
    ToolExecuting,
    /// The model refused tools; the input is resubmitted once without them
    ToolRejectedRetry { original_input: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Busy,
    NoModel,
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Rejected(RejectReason),
    Completed { iterations: usize, exhausted: bool },
    Aborted,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Shared view of the in-flight submission, usable from other tasks
#[derive(Debug, Clone, Default)]
pub struct GenerationHandle {
    generating: Arc<AtomicBool>,
    token: Arc<Mutex<CancellationToken>>,
}

impl GenerationHandle {
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Cancels the current submission, if any
    pub fn cancel(&self) {
        if self.is_generating() {
            self.current_token().cancel();
        }
    }

    /// Marks a submission as started; `None` while another one is running
    pub fn begin(&self) -> Option<GenerationGuard> {
        if self
            .generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let token = CancellationToken::new();
        match self.token.lock() {
            Ok(mut current) => *current = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }

        Some(GenerationGuard {
            generating: self.generating.clone(),
            token,
        })
    }

    fn current_token(&self) -> CancellationToken {
        match self.token.lock() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Clears the generating flag when dropped
#[derive(Debug)]
pub struct GenerationGuard {
    generating: Arc<AtomicBool>,
    token: CancellationToken,
}

impl GenerationGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.generating.store(false, Ordering::SeqCst);
    }
}
