use super::core::ToolRegistry;
use super::impls::WebSearchTool;
use super::ToolError;
use llm::{ToolArguments, ToolCall, ToolDeclaration};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use web::SearchProvider;

const DUPLICATE_CALL_MESSAGE: &str = "Tool already executed with these exact arguments. Do not repeat the same call. If no results were found previously, try a different query or answer based on available knowledge.";

/// Result payload for a call that repeats an earlier one
pub fn duplicate_call_payload() -> String {
    json!({ "error": DUPLICATE_CALL_MESSAGE }).to_string()
}

/// Executes tool calls against the registered tools.
///
/// Execution always resolves to a JSON string. Failures become `{"error": ...}`
/// payloads so the model can react to them.
pub struct ToolRuntime {
    registry: ToolRegistry,
}

impl ToolRuntime {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Runtime offering the `web_search` tool backed by `provider`
    pub fn with_web_search(provider: Arc<dyn SearchProvider>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WebSearchTool::new(provider)));
        Self::new(registry)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.registry.declarations()
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    pub async fn execute(&self, call: &ToolCall) -> String {
        let result = match self.try_execute(call).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                if let ToolError::InvalidArguments(detail) = &e {
                    debug!("Rejected arguments for {}: {}", call.name, detail);
                }
                e.to_payload().to_string()
            }
        };
        debug!(
            "Tool {} result: {}",
            call.name,
            result.chars().take(200).collect::<String>()
        );
        result
    }

    async fn try_execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let arguments = normalize_arguments(&call.arguments)?;
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tool.invoke(Value::Object(arguments)).await
    }
}

/// Resolves raw or structured arguments into a mapping.
///
/// Raw text must be valid JSON; valid JSON that is not an object yields an
/// empty mapping.
pub fn normalize_arguments(arguments: &ToolArguments) -> Result<Map<String, Value>, ToolError> {
    match arguments {
        ToolArguments::Structured(map) => Ok(map.clone()),
        ToolArguments::Raw(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
        },
    }
}
