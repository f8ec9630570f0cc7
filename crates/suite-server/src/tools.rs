//! Built-in host tools
//!
//! Tools every host exposes: an echo probe, registry introspection, and the
//! API-key session lifecycle (login, status, logout) on top of the shared
//! session manager. Auth failures come back as tool errors carrying the
//! error code; secrets are never echoed.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use suite_auth::{AuthError, SessionManager, AUTH_TYPE_API_KEY};
use suite_mcp::{
    parse_params, McpServerError, McpServerResult, Params, Tool, ToolDefinition, ToolRegistry,
    ToolResult,
};
use tracing::{debug, instrument, warn};

fn auth_error_result(e: &AuthError) -> ToolResult {
    ToolResult::error(format!("[{}] {}", e.error_code(), e))
}

fn storage_failure(e: AuthError) -> McpServerError {
    McpServerError::ExecutionError(e.to_string())
}

fn session_id_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "session_id": {
                "type": "string",
                "description": description
            }
        },
        "required": ["session_id"]
    })
}

#[derive(Debug, Deserialize)]
struct SessionIdParams {
    session_id: String,
}

/// Returns its `text` parameter unchanged.
pub struct EchoTool;

#[derive(Debug, Deserialize)]
struct EchoParams {
    text: String,
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Return the given text unchanged")
            .with_category("diagnostics")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to return"
                    }
                },
                "required": ["text"]
            }))
    }

    async fn execute(&self, params: Params) -> McpServerResult<ToolResult> {
        let params: EchoParams = parse_params(params)?;
        Ok(ToolResult::text(params.text))
    }
}

/// Lists every registered tool with its description and parameter schema.
///
/// Holds the registry weakly so the registry can own this tool.
pub struct ListToolsTool {
    registry: Weak<ToolRegistry>,
}

impl ListToolsTool {
    /// Create a tool that introspects `registry`.
    pub fn new(registry: &Arc<ToolRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

#[async_trait]
impl Tool for ListToolsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_tools", "List available tools and their parameter schemas")
            .with_category("diagnostics")
    }

    async fn execute(&self, _params: Params) -> McpServerResult<ToolResult> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| McpServerError::Internal("tool registry is gone".to_string()))?;

        let schemas = registry.schemas().await;
        let value =
            serde_json::to_value(&schemas).map_err(|e| McpServerError::Internal(e.to_string()))?;
        Ok(ToolResult::json(value))
    }
}

/// Creates an API-key session through the manager's `api_key` provider.
pub struct ApiKeyLoginTool {
    manager: SessionManager,
    default_ttl_secs: Option<i64>,
}

impl ApiKeyLoginTool {
    /// Create the tool. `default_ttl_secs` applies when the caller gives no `expires_in`.
    pub fn new(manager: SessionManager, default_ttl_secs: Option<i64>) -> Self {
        Self {
            manager,
            default_ttl_secs,
        }
    }
}

#[async_trait]
impl Tool for ApiKeyLoginTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("api_key_login", "Authenticate with an API key and open a session")
            .with_category("auth")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "api_key": {"type": "string", "description": "API key or token id"},
                    "api_secret": {"type": "string", "description": "API secret, if the service uses one"},
                    "key_id": {"type": "string", "description": "Identifier of the key"},
                    "expires_in": {"type": "integer", "description": "Session lifetime in seconds"},
                    "metadata": {"type": "object", "description": "Free-form session metadata"}
                },
                "required": ["api_key"]
            }))
    }

    #[instrument(skip(self, params), fields(tool = "api_key_login"))]
    async fn execute(&self, mut params: Params) -> McpServerResult<ToolResult> {
        if let Some(ttl) = self.default_ttl_secs {
            params
                .entry("expires_in")
                .or_insert_with(|| serde_json::Value::from(ttl));
        }

        match self
            .manager
            .authenticate(AUTH_TYPE_API_KEY, serde_json::Value::Object(params))
            .await
        {
            Ok(session) => Ok(ToolResult::json(serde_json::json!({
                "session_id": session.session_id,
                "auth_type": session.auth_type,
                "expires_at": session.expires_at,
            }))),
            Err(e) => {
                warn!(error = %e, "API key login failed");
                Ok(auth_error_result(&e))
            }
        }
    }
}

/// Reports whether a stored session is expired and still valid.
///
/// Validity is judged by the provider registered for the session's auth type.
pub struct SessionStatusTool {
    manager: SessionManager,
}

impl SessionStatusTool {
    /// Create the tool.
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SessionStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("session_status", "Show expiry and validity of a session")
            .with_category("auth")
            .with_schema(session_id_schema("Session to inspect"))
    }

    async fn execute(&self, params: Params) -> McpServerResult<ToolResult> {
        let params: SessionIdParams = parse_params(params)?;

        let Some(session) = self
            .manager
            .get_session(&params.session_id)
            .await
            .map_err(storage_failure)?
        else {
            return Ok(auth_error_result(&AuthError::SessionNotFound(
                params.session_id,
            )));
        };

        let valid = match self.manager.providers().get(&session.auth_type).await {
            Some(provider) => provider.validate_session(&session).await,
            None => {
                debug!(auth_type = %session.auth_type, "No provider for session type");
                false
            }
        };

        Ok(ToolResult::json(serde_json::json!({
            "session_id": session.session_id,
            "auth_type": session.auth_type,
            "expired": session.is_expired(),
            "valid": valid,
            "expires_at": session.expires_at,
            "last_used_at": session.last_used_at,
        })))
    }
}

/// Deletes a session.
pub struct LogoutTool {
    manager: SessionManager,
}

impl LogoutTool {
    /// Create the tool.
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for LogoutTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("logout", "End a session")
            .with_category("auth")
            .with_schema(session_id_schema("Session to end"))
    }

    async fn execute(&self, params: Params) -> McpServerResult<ToolResult> {
        let params: SessionIdParams = parse_params(params)?;
        let removed = self
            .manager
            .delete_session(&params.session_id)
            .await
            .map_err(storage_failure)?;

        Ok(ToolResult::json(serde_json::json!({
            "session_id": params.session_id,
            "removed": removed,
        })))
    }
}

/// Register every built-in tool into `registry`.
pub async fn register_builtin_tools(
    registry: &Arc<ToolRegistry>,
    manager: &SessionManager,
    default_ttl_secs: Option<i64>,
) -> McpServerResult<()> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(EchoTool),
        Arc::new(ListToolsTool::new(registry)),
        Arc::new(ApiKeyLoginTool::new(manager.clone(), default_ttl_secs)),
        Arc::new(SessionStatusTool::new(manager.clone())),
        Arc::new(LogoutTool::new(manager.clone())),
    ];
    registry.register_all(tools).await
}
