//! # Suite MCP
//!
//! This crate provides a small tool-invocation server: named, schema-described
//! tools exposed over a line-oriented request/response channel.
//!
//! ## Overview
//!
//! The suite-mcp crate handles:
//! - **Messages**: [`McpRequest`] / [`McpResponse`] and their wire shapes
//! - **Tools**: the [`Tool`] capability and the [`FunctionTool`] wrapper
//! - **Registry**: name → tool lookup with unique names and schema introspection
//! - **Transport**: newline-delimited JSON over stdin/stdout ([`StdioTransport`])
//! - **Server**: the initialize → register → serve → shutdown state machine
//!
//! ## Wire Protocol
//!
//! One JSON document per line:
//!
//! ```text
//! -> {"tool": "echo", "params": {"text": "hi"}, "request_id": "1"}
//! <- {"content": [{"type": "text", "text": "hi"}], "request_id": "1"}
//! -> {"tool": "nonexistent"}
//! <- {"content": [], "error": "Unknown tool: nonexistent"}
//! ```
//!
//! Lines that cannot be decoded are logged and skipped; end of input ends the
//! serve loop and shuts the server down.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use suite_mcp::{
//!     McpServer, McpServerResult, Params, StdioTransport, Tool, ToolDefinition, ToolResult,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Tool for Hello {
//!     fn definition(&self) -> ToolDefinition {
//!         ToolDefinition::new("hello", "Says hello")
//!     }
//!
//!     async fn execute(&self, _params: Params) -> McpServerResult<ToolResult> {
//!         Ok(ToolResult::text("Hello!"))
//!     }
//! }
//!
//! async fn serve() -> McpServerResult<()> {
//!     let mut server = McpServer::new("hello-server", "0.1.0", StdioTransport::stdio());
//!     server.initialize().await?;
//!     server.register_tools().await?;
//!     server.registry().register(Arc::new(Hello)).await?;
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod registry;
pub mod server;
pub mod tool;
pub mod transport;
pub mod types;

// Re-export main types
pub use registry::ToolRegistry;
pub use server::{
    McpServer, McpServerError, McpServerResult, ServeStats, ServerBackend, ServerInfo,
    ServerState,
};
pub use tool::{parse_params, FunctionTool, Tool};
pub use transport::{Inbound, LineTransport, StdioTransport, Transport, DEFAULT_MAX_LINE_BYTES};
pub use types::{
    ContentBlock, McpRequest, McpResponse, Params, ToolDefinition, ToolResult, ToolSchema,
};
