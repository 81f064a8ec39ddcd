//! Tool registry for Steward
//!
//! This module provides the `ToolRegistry` struct: an ordered catalog of tools,
//! looked up by name during dispatch. Registration order is the order the
//! catalog is offered to the model.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::providers::ToolDefinition;

use super::Tool;

/// Static descriptor of a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments
    pub parameters: Value,
    /// Whether calls go through the permission gate
    pub sensitive: bool,
}

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use steward::tools::{EchoTool, ToolRegistry};
///
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// assert!(registry.has("echo"));
/// let info = registry.lookup("echo").unwrap();
/// assert!(!info.sensitive);
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool in the registry.
    ///
    /// If a tool with the same name already exists, it is replaced in place,
    /// keeping its catalog position.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, sensitive = tool.is_sensitive(), "Registering tool");
        let tool: Arc<dyn Tool> = Arc::from(tool);
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Get the static descriptor of a tool.
    ///
    /// # Example
    /// ```
    /// use steward::tools::ToolRegistry;
    ///
    /// let registry = ToolRegistry::new();
    /// assert!(registry.lookup("missing").is_none());
    /// ```
    pub fn lookup(&self, name: &str) -> Option<ToolInfo> {
        self.get(name).map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters(),
            sensitive: t.is_sensitive(),
        })
    }

    /// Get all tool definitions for use with LLM providers, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Get the names of all registered tools, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
