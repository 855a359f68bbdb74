use llm::ToolDeclaration;

/// Specification for a tool, including metadata
#[derive(Clone)]
pub struct ToolSpec {
    /// Unique name of the tool
    pub name: &'static str,
    /// Detailed description of what the tool does
    pub description: &'static str,
    /// JSON Schema for the tool's parameters
    pub parameters_schema: serde_json::Value,
}

impl ToolSpec {
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::function(self.name, self.description, self.parameters_schema.clone())
    }
}
