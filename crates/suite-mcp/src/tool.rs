//! Tool abstraction
//!
//! A tool is a named capability with a parameter schema and an asynchronous
//! behavior. Concrete tools implement [`Tool`]; closures can be wrapped with
//! [`FunctionTool`].

use crate::server::{McpServerError, McpServerResult};
use crate::types::{Params, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition (name, description, parameter schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given parameters.
    ///
    /// Any error returned here is converted into an error response by the
    /// server; it never ends the serve loop.
    async fn execute(&self, params: Params) -> McpServerResult<ToolResult>;
}

/// Deserialize tool parameters into a typed struct.
///
/// # Errors
///
/// Returns [`McpServerError::InvalidParams`] if the mapping does not match `T`.
pub fn parse_params<T: DeserializeOwned>(params: Params) -> McpServerResult<T> {
    serde_json::from_value(serde_json::Value::Object(params))
        .map_err(|e| McpServerError::InvalidParams(e.to_string()))
}

/// Simple tool wrapper for function-based tools.
pub struct FunctionTool<F>
where
    F: Fn(Params) -> McpServerResult<ToolResult> + Send + Sync,
{
    definition: ToolDefinition,
    handler: F,
}

impl<F> FunctionTool<F>
where
    F: Fn(Params) -> McpServerResult<ToolResult> + Send + Sync,
{
    /// Create a new function-based tool.
    pub fn new(definition: ToolDefinition, handler: F) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

#[async_trait]
impl<F> Tool for FunctionTool<F>
where
    F: Fn(Params) -> McpServerResult<ToolResult> + Send + Sync,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Params) -> McpServerResult<ToolResult> {
        (self.handler)(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct SearchParams {
        query: String,
        #[serde(default = "default_count")]
        count: u32,
    }

    fn default_count() -> u32 {
        10
    }

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_params() {
        let parsed: SearchParams = parse_params(params(json!({"query": "rust"}))).unwrap();
        assert_eq!(parsed.query, "rust");
        assert_eq!(parsed.count, 10);
    }

    #[test]
    fn test_parse_params_invalid() {
        let err = parse_params::<SearchParams>(params(json!({"count": 3}))).unwrap_err();
        assert!(matches!(err, McpServerError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_function_tool() {
        let tool = FunctionTool::new(ToolDefinition::new("upper", "Uppercase text"), |p| {
            let text = p.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(ToolResult::text(text.to_uppercase()))
        });

        assert_eq!(tool.definition().name, "upper");
        let result = tool.execute(params(json!({"text": "abc"}))).await.unwrap();
        assert_eq!(result.joined_text(), "ABC");
    }
}
