use std::collections::HashMap;

use super::dyn_tool::DynTool;
use llm::ToolDeclaration;

/// Registry of the tools available to the model
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool in the registry
    pub fn register(&mut self, tool: Box<dyn DynTool>) {
        self.tools.insert(tool.spec().name.to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn DynTool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations of all registered tools, ordered by name
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut specs: Vec<_> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by_key(|spec| spec.name);
        specs.iter().map(|spec| spec.declaration()).collect()
    }
}
