//! Tool registry
//!
//! The registry is the authoritative name → tool table used for dispatch and
//! introspection. It is owned by the server and handed explicitly to whatever
//! registers tools; there is no process-wide registry.
//!
//! Registration may happen while the server is serving, so the table sits
//! behind an async `RwLock`. Insertion order is preserved.

use crate::server::{McpServerError, McpServerResult};
use crate::tool::Tool;
use crate::types::{ToolDefinition, ToolSchema};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Name → tool mapping with unique names.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, Arc<dyn Tool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::DuplicateTool`] if a tool with the same name is
    /// already registered. The existing registration stays active.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> McpServerResult<()> {
        let name = tool.definition().name;

        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(McpServerError::DuplicateTool(name));
        }

        tools.insert(name.clone(), tool);
        info!(tool = %name, "Tool registered");
        Ok(())
    }

    /// Register multiple tools, stopping at the first duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::DuplicateTool`] for the first name already
    /// present; tools before it remain registered.
    pub async fn register_all(&self, tools: Vec<Arc<dyn Tool>>) -> McpServerResult<()> {
        for tool in tools {
            self.register(tool).await?;
        }
        Ok(())
    }

    /// Remove a tool.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::ToolNotFound`] if no tool has that name.
    pub async fn unregister(&self, name: &str) -> McpServerResult<Arc<dyn Tool>> {
        let mut tools = self.tools.write().await;
        let tool = tools
            .shift_remove(name)
            .ok_or_else(|| McpServerError::ToolNotFound(name.to_string()))?;

        info!(tool = %name, "Tool unregistered");
        Ok(tool)
    }

    /// Look up a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check whether a tool is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// All tools in registration order.
    pub async fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().await.values().cloned().collect()
    }

    /// All tool names in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// All tool definitions in registration order.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .await
            .values()
            .map(|t| t.definition())
            .collect()
    }

    /// Name → {description, schema} for introspection.
    pub async fn schemas(&self) -> IndexMap<String, ToolSchema> {
        self.tools
            .read()
            .await
            .iter()
            .map(|(name, tool)| (name.clone(), ToolSchema::from(tool.definition())))
            .collect()
    }

    /// Number of registered tools.
    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Remove every tool.
    pub async fn clear(&self) {
        let mut tools = self.tools.write().await;
        let count = tools.len();
        tools.clear();
        debug!(count, "Registry cleared");
    }
}
