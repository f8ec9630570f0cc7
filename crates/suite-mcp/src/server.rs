//! MCP server implementation
//!
//! This module provides the server state machine that ties a [`Transport`]
//! to a [`ToolRegistry`]:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --serve--> Serving --EOF--> ShutDown
//!        |                                                               ^
//!        +------------------------- shutdown ----------------------------+
//! ```
//!
//! The serve loop is strictly sequential: one request is read, dispatched and
//! answered before the next is read, so responses leave in arrival order.

use crate::registry::ToolRegistry;
use crate::transport::{Inbound, Transport};
use crate::types::{McpRequest, McpResponse, ToolSchema};
use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// MCP server error types.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Tool not found
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool name already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool execution failed
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Request line could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transport used while disconnected
    #[error("Transport not connected")]
    NotConnected,

    /// Operation not allowed in the current server state
    #[error("Invalid server state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires
        expected: ServerState,
        /// State the server is in
        actual: ServerState,
    },

    /// Serve attempted before the backend registered its tools
    #[error("Tools not registered; call register_tools before serve")]
    ToolsNotRegistered,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for MCP server operations.
pub type McpServerResult<T> = Result<T, McpServerError>;

/// Lifecycle states of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Created, resources not prepared
    Uninitialized,
    /// Resources prepared, ready to serve
    Initialized,
    /// Serve loop running
    Serving,
    /// Terminal
    ShutDown,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Uninitialized => "uninitialized",
            ServerState::Initialized => "initialized",
            ServerState::Serving => "serving",
            ServerState::ShutDown => "shut_down",
        };
        f.write_str(s)
    }
}

/// Server-specific behavior plugged into the state machine.
///
/// A backend prepares whatever the concrete server needs (upstream
/// connections, sessions), registers its tools into the registry it is handed,
/// and releases resources on shutdown.
#[async_trait]
pub trait ServerBackend: Send + Sync {
    /// Prepare resources. An error keeps the server uninitialized.
    async fn initialize(&self) -> McpServerResult<()> {
        Ok(())
    }

    /// Register this backend's tools.
    async fn register_tools(&self, registry: &Arc<ToolRegistry>) -> McpServerResult<()>;

    /// Release resources.
    async fn shutdown(&self) {}
}

/// Backend with no resources and no tools of its own.
struct NoopBackend;

#[async_trait]
impl ServerBackend for NoopBackend {
    async fn register_tools(&self, _registry: &Arc<ToolRegistry>) -> McpServerResult<()> {
        Ok(())
    }
}

/// Server name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,

    /// Server version
    pub version: String,
}

/// Counters reported when the serve loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Requests answered
    pub handled: u64,

    /// Lines discarded as undecodable
    pub malformed: u64,
}

/// Tool server over a single transport.
pub struct McpServer<T: Transport> {
    info: ServerInfo,
    transport: T,
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn ServerBackend>,
    state: ServerState,
    tools_registered: bool,
}

impl<T: Transport> std::fmt::Debug for McpServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> McpServer<T> {
    /// Create a new server over `transport` with an empty registry.
    pub fn new(name: impl Into<String>, version: impl Into<String>, transport: T) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            transport,
            registry: Arc::new(ToolRegistry::new()),
            backend: Arc::new(NoopBackend),
            state: ServerState::Uninitialized,
            tools_registered: false,
        }
    }

    /// Use `backend` for initialize/register/shutdown hooks.
    pub fn with_backend(mut self, backend: Arc<dyn ServerBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Use an existing registry.
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Get server info.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The registry used for dispatch.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Name → {description, schema} of every registered tool.
    pub async fn schemas(&self) -> IndexMap<String, ToolSchema> {
        self.registry.schemas().await
    }

    fn expect_state(&self, expected: ServerState) -> McpServerResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(McpServerError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Prepare server resources.
    ///
    /// # Errors
    ///
    /// Fails if the server is not uninitialized, or with the backend's error;
    /// in both cases the state is unchanged.
    pub async fn initialize(&mut self) -> McpServerResult<()> {
        self.expect_state(ServerState::Uninitialized)?;

        if let Err(e) = self.backend.initialize().await {
            error!(server = %self.info.name, error = %e, "Server initialization failed");
            return Err(e);
        }

        self.state = ServerState::Initialized;
        info!(server = %self.info.name, version = %self.info.version, "Server initialized");
        Ok(())
    }

    /// Let the backend populate the registry.
    ///
    /// # Errors
    ///
    /// Fails unless the server is initialized, or with the backend's error.
    /// Registering twice is a no-op.
    pub async fn register_tools(&mut self) -> McpServerResult<()> {
        self.expect_state(ServerState::Initialized)?;
        if self.tools_registered {
            debug!("Tools already registered");
            return Ok(());
        }

        self.backend.register_tools(&self.registry).await?;
        self.tools_registered = true;

        info!(tools = self.registry.len().await, "Tools registered");
        Ok(())
    }

    /// Dispatch one request and build its response.
    ///
    /// Never fails: unknown tools, tool errors and tool panics all become
    /// error responses. The response carries the request's correlation id.
    #[instrument(skip(self, request), fields(tool = request.tool_name(), request_id = request.request_id().unwrap_or("-")))]
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let (tool_name, params, request_id) = request.into_parts();

        let Some(tool) = self.registry.get(&tool_name).await else {
            warn!("Unknown tool requested");
            return McpResponse::error(McpServerError::ToolNotFound(tool_name).to_string())
                .with_request_id(request_id);
        };

        let outcome = AssertUnwindSafe(tool.execute(params)).catch_unwind().await;

        let response = match outcome {
            Ok(Ok(result)) => {
                debug!(is_error = result.is_error, "Tool completed");
                result.into_response()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Tool failed");
                McpResponse::error(e.to_string())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(reason = %reason, "Tool panicked");
                McpResponse::error(McpServerError::ExecutionError(reason).to_string())
            }
        };

        response.with_request_id(request_id)
    }

    /// Run the serve loop until end of stream, then shut down.
    ///
    /// Malformed lines are logged, counted and skipped without a response.
    /// A read failure ends the loop like end of stream; a write failure is
    /// logged and the loop continues.
    ///
    /// # Errors
    ///
    /// Fails if the server is not initialized, if [`register_tools`](Self::register_tools)
    /// has not succeeded, or if the transport cannot connect.
    pub async fn serve(&mut self) -> McpServerResult<ServeStats> {
        self.expect_state(ServerState::Initialized)?;
        if !self.tools_registered {
            return Err(McpServerError::ToolsNotRegistered);
        }

        self.transport.connect().await?;
        self.state = ServerState::Serving;
        info!(server = %self.info.name, "Serving requests");

        let mut stats = ServeStats::default();
        loop {
            let inbound = match self.transport.receive_request().await {
                Ok(inbound) => inbound,
                Err(e) => {
                    error!(error = %e, "Failed to read from transport");
                    break;
                }
            };

            match inbound {
                Inbound::EndOfStream => break,
                Inbound::Malformed(reason) => {
                    stats.malformed += 1;
                    debug!(reason = %reason, "Skipping malformed line");
                }
                Inbound::Request(request) => {
                    let response = self.handle_request(request).await;
                    if let Err(e) = self.transport.send_response(&response).await {
                        error!(error = %e, "Failed to send response");
                    }
                    stats.handled += 1;
                }
            }
        }

        info!(
            handled = stats.handled,
            malformed = stats.malformed,
            "Serve loop finished"
        );
        self.shutdown().await;
        Ok(stats)
    }

    /// Initialize, register tools and serve until end of stream.
    ///
    /// # Errors
    ///
    /// Propagates the first lifecycle failure.
    pub async fn run(&mut self) -> McpServerResult<ServeStats> {
        self.initialize().await?;
        self.register_tools().await?;
        self.serve().await
    }

    /// Release resources and enter the terminal state.
    ///
    /// Idempotent: calling it again does nothing.
    pub async fn shutdown(&mut self) {
        if self.state == ServerState::ShutDown {
            debug!("Shutdown already complete");
            return;
        }

        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Transport disconnect failed");
            }
        }

        if self.state != ServerState::Uninitialized {
            self.backend.shutdown().await;
        }

        self.state = ServerState::ShutDown;
        info!(server = %self.info.name, "Server shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FunctionTool, Tool};
    use crate::transport::LineTransport;
    use crate::types::{Params, ToolDefinition, ToolResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

    type PipeTransport = LineTransport<BufReader<DuplexStream>, DuplexStream>;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echo the text parameter").with_category("test")
        }

        async fn execute(&self, params: Params) -> McpServerResult<ToolResult> {
            let text = params
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| McpServerError::InvalidParams("missing text".to_string()))?;
            Ok(ToolResult::text(text))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("explode", "Always panics")
        }

        async fn execute(&self, _params: Params) -> McpServerResult<ToolResult> {
            panic!("kaboom")
        }
    }

    #[derive(Default)]
    struct TestBackend {
        fail_init: bool,
        fail_register: bool,
        shut_down: AtomicBool,
    }

    #[async_trait]
    impl ServerBackend for TestBackend {
        async fn initialize(&self) -> McpServerResult<()> {
            if self.fail_init {
                return Err(McpServerError::Internal("upstream unreachable".to_string()));
            }
            Ok(())
        }

        async fn register_tools(&self, registry: &Arc<ToolRegistry>) -> McpServerResult<()> {
            if self.fail_register {
                return Err(McpServerError::Internal("no tools today".to_string()));
            }
            registry.register(Arc::new(EchoTool)).await?;
            registry.register(Arc::new(PanicTool)).await
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn pipe_server(backend: Arc<TestBackend>) -> (McpServer<PipeTransport>, DuplexStream, DuplexStream) {
        let (client_in, server_in) = duplex(64 * 1024);
        let (server_out, client_out) = duplex(64 * 1024);
        let transport = LineTransport::from_streams(BufReader::new(server_in), server_out);
        let server = McpServer::new("test-server", "0.0.0", transport).with_backend(backend);
        (server, client_in, client_out)
    }

    async fn read_lines(mut rx: DuplexStream) -> Vec<McpResponse> {
        let mut out = String::new();
        rx.read_to_string(&mut out).await.unwrap();
        out.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_server_creation() {
        let (server, _tx, _rx) = pipe_server(Arc::default());
        assert_eq!(server.info().name, "test-server");
        assert_eq!(server.state(), ServerState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_failure_keeps_state() {
        let backend = Arc::new(TestBackend {
            fail_init: true,
            ..Default::default()
        });
        let (mut server, _tx, _rx) = pipe_server(backend);

        assert!(server.initialize().await.is_err());
        assert_eq!(server.state(), ServerState::Uninitialized);
    }

    #[tokio::test]
    async fn test_register_tools_requires_initialize() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());

        let err = server.register_tools().await.unwrap_err();
        assert!(matches!(err, McpServerError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_serve_requires_registered_tools() {
        let backend = Arc::new(TestBackend::default());
        let (mut server, _tx, _rx) = pipe_server(backend);
        server.initialize().await.unwrap();

        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, McpServerError::ToolsNotRegistered));
        assert_eq!(server.state(), ServerState::Initialized);
        assert!(server.schemas().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_registration_blocks_serve() {
        let backend = Arc::new(TestBackend {
            fail_register: true,
            ..Default::default()
        });
        let (mut server, _tx, _rx) = pipe_server(backend);
        server.initialize().await.unwrap();

        assert!(server.register_tools().await.is_err());
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, McpServerError::ToolsNotRegistered));
    }

    #[tokio::test]
    async fn test_register_tools_twice_is_noop() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());
        server.initialize().await.unwrap();

        server.register_tools().await.unwrap();
        server.register_tools().await.unwrap();
        assert_eq!(server.registry().len().await, 2);
    }

    #[tokio::test]
    async fn test_handle_unknown_tool() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());
        server.initialize().await.unwrap();
        server.register_tools().await.unwrap();

        let resp = server
            .handle_request(McpRequest::new("nonexistent").with_request_id("r1"))
            .await;
        assert!(resp.is_error);
        assert!(resp.error.unwrap().contains("nonexistent"));
        assert_eq!(resp.request_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_handle_tool_error_and_panic() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());
        server.initialize().await.unwrap();
        server.register_tools().await.unwrap();

        let resp = server.handle_request(McpRequest::new("echo")).await;
        assert!(resp.is_error);
        assert!(resp.error.unwrap().contains("missing text"));

        let resp = server.handle_request(McpRequest::new("explode")).await;
        assert!(resp.is_error);
        assert!(resp.error.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_serve_answers_in_order() {
        let backend = Arc::new(TestBackend::default());
        let (mut server, mut tx, rx) = pipe_server(backend.clone());

        tx.write_all(
            concat!(
                "{\"tool\":\"nonexistent\",\"params\":{},\"request_id\":\"1\"}\n",
                "not json at all\n",
                "{\"tool\":\"echo\",\"params\":{\"text\":\"hi\"},\"request_id\":\"2\"}\n",
                "{\"tool\":\"explode\"}\n",
                "{\"tool\":\"echo\",\"params\":{\"text\":\"last\"}}\n",
            )
            .as_bytes(),
        )
        .await
        .unwrap();
        drop(tx);

        let stats = server.run().await.unwrap();
        assert_eq!(stats, ServeStats { handled: 4, malformed: 1 });
        assert_eq!(server.state(), ServerState::ShutDown);
        assert!(backend.shut_down.load(Ordering::SeqCst));
        drop(server);

        let responses = read_lines(rx).await;
        assert_eq!(responses.len(), 4);

        assert!(responses[0].is_error);
        assert_eq!(responses[0].request_id.as_deref(), Some("1"));

        assert!(!responses[1].is_error);
        assert_eq!(responses[1].request_id.as_deref(), Some("2"));
        assert_eq!(responses[1].content[0].as_text(), Some("hi"));

        assert!(responses[2].is_error);
        assert_eq!(responses[2].request_id, None);

        assert_eq!(responses[3].content[0].as_text(), Some("last"));
        assert_eq!(responses[3].request_id, None);
    }

    #[tokio::test]
    async fn test_dynamic_registration_while_idle() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());
        server.initialize().await.unwrap();

        let tool = FunctionTool::new(ToolDefinition::new("late", "Registered later"), |_| {
            Ok(ToolResult::text("late"))
        });
        server.registry().register(Arc::new(tool)).await.unwrap();

        let resp = server.handle_request(McpRequest::new("late")).await;
        assert!(!resp.is_error);
        assert!(server.schemas().await.contains_key("late"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (mut server, _tx, _rx) = pipe_server(Arc::default());
        server.initialize().await.unwrap();

        server.shutdown().await;
        assert_eq!(server.state(), ServerState::ShutDown);
        server.shutdown().await;
        assert_eq!(server.state(), ServerState::ShutDown);

        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, McpServerError::InvalidState { .. }));
    }
}
