pub mod terminal;
pub mod transcript;

use crate::agent::OrchestratorState;
use crate::render::{Presentation, ProjectionEffects};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Progress of a single tool call as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub enum ToolStatus {
    Calling,
    /// Repeat of an earlier call, answered without running the tool
    Duplicate,
    Succeeded { results_count: usize },
    Failed { error: String },
}

impl ToolStatus {
    /// Derives the final status from a tool result payload
    pub fn from_result(result: &str) -> Self {
        let value: Value = match serde_json::from_str(result) {
            Ok(value) => value,
            Err(_) => return ToolStatus::Succeeded { results_count: 0 },
        };
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return ToolStatus::Failed {
                error: error.to_string(),
            };
        }
        let results_count = value
            .get("results_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        ToolStatus::Succeeded { results_count }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    StateChanged(OrchestratorState),
    TurnStarted {
        turn_id: u64,
    },
    /// Full projection of a turn after new text arrived
    TurnUpdated {
        turn_id: u64,
        presentation: Presentation,
        effects: ProjectionEffects,
    },
    /// A turn was discarded and must disappear from the display
    TurnRemoved {
        turn_id: u64,
    },
    ToolStatus {
        turn_id: u64,
        name: String,
        status: ToolStatus,
    },
    RetrievalHits {
        count: usize,
    },
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum UIError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Input not supported in this UI mode")]
    InputNotSupported,
}

#[async_trait]
pub trait UserInterface: Send + Sync {
    async fn send_event(&self, event: UiEvent) -> Result<(), UIError>;
}
