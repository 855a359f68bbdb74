// Core tools implementation
pub mod dyn_tool;
pub mod registry;
pub mod spec;
pub mod tool;

// Re-export all core components
pub use registry::ToolRegistry;
pub use spec::ToolSpec;
pub use tool::Tool;
