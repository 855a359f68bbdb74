pub mod core;
pub mod impls;
mod policy;
mod runtime;

pub use policy::wants_tools;
pub use runtime::{duplicate_call_payload, ToolRuntime};

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Invalid tool arguments format")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    #[error("No search results found")]
    NoResults { query: String },

    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    /// Result payload handed back to the model in place of a tool output
    pub fn to_payload(&self) -> Value {
        match self {
            ToolError::NoResults { query } => json!({ "error": self.to_string(), "query": query }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}
