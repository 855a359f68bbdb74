use super::spec::ToolSpec;
use crate::tools::ToolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Core trait for tools, defining the execution interface
#[async_trait::async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Input type for this tool, must be deserializable from JSON
    type Input: DeserializeOwned + Send;

    /// Output type for this tool, serialized as the tool result
    type Output: Serialize + Send;

    /// Get the metadata for this tool
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with the given input
    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ToolError>;
}
