//! MCP protocol types
//!
//! This module defines the values exchanged over the line protocol: the
//! [`McpRequest`] decoded from an inbound line, the [`McpResponse`] written
//! back, and the tool-side descriptors ([`ToolDefinition`], [`ToolResult`]).
//!
//! Wire shapes:
//!
//! ```text
//! request:  {"tool": "<name>", "params": {...}, "request_id": "<opaque>"}
//! response: {"content": [{"type": "text", "text": "..."}], "request_id": "<opaque>"}
//! error:    {"content": [], "error": "<message>", "request_id": "<opaque>"}
//! ```

use crate::server::{McpServerError, McpServerResult};
use serde::{Deserialize, Serialize};

/// Tool parameters: an ordered mapping of string keys to arbitrary JSON values.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A decoded tool invocation.
///
/// Created when a line is decoded off the transport and consumed exactly once
/// by the server loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRequest", into = "WireRequest")]
pub struct McpRequest {
    tool_name: String,
    params: Params,
    request_id: Option<String>,
}

impl McpRequest {
    /// Create a new request for the named tool with no parameters.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            params: Params::new(),
            request_id: None,
        }
    }

    /// Set the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set the caller-assigned correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Decode a request from one line of the wire protocol.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Decode`] for malformed JSON, a missing or
    /// empty `tool` field, non-object `params` or a non-string `request_id`.
    pub fn from_line(line: &str) -> McpServerResult<Self> {
        serde_json::from_str(line).map_err(|e| McpServerError::Decode(e.to_string()))
    }

    /// Decode a request from an already parsed JSON document.
    ///
    /// # Errors
    ///
    /// Same rules as [`McpRequest::from_line`].
    pub fn from_value(value: serde_json::Value) -> McpServerResult<Self> {
        serde_json::from_value(value).map_err(|e| McpServerError::Decode(e.to_string()))
    }

    /// Name of the tool to invoke.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Parameters for the tool.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Correlation id, if the caller supplied one.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Split into owned parts.
    pub fn into_parts(self) -> (String, Params, Option<String>) {
        (self.tool_name, self.params, self.request_id)
    }
}

#[derive(Serialize, Deserialize)]
struct WireRequest {
    tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl TryFrom<WireRequest> for McpRequest {
    type Error = String;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        if wire.tool.trim().is_empty() {
            return Err("field `tool` must not be empty".to_string());
        }

        Ok(Self {
            tool_name: wire.tool,
            params: wire.params.unwrap_or_default(),
            request_id: wire.request_id,
        })
    }
}

impl From<McpRequest> for WireRequest {
    fn from(request: McpRequest) -> Self {
        Self {
            tool: request.tool_name,
            params: Some(request.params),
            request_id: request.request_id,
        }
    }
}

/// Response to exactly one request.
///
/// If `is_error` is set, `error` carries a non-empty message and `content` is
/// normally empty. The `error` key only appears on the wire for error
/// responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireResponse", into = "WireResponse")]
pub struct McpResponse {
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Error message (set together with `is_error`)
    pub error: Option<String>,

    /// Whether this response reports a failure
    pub is_error: bool,

    /// Correlation id echoed from the request
    pub request_id: Option<String>,
}

impl McpResponse {
    /// Create a success response with the given content.
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            error: None,
            is_error: false,
            request_id: None,
        }
    }

    /// Create a success response with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ContentBlock::text(text)])
    }

    /// Create an error response.
    ///
    /// An empty message is replaced so the error is never blank.
    pub fn error(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }

        Self {
            content: Vec::new(),
            error: Some(message),
            is_error: true,
            request_id: None,
        }
    }

    /// Attach the correlation id of the originating request.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Append a text block.
    pub fn add_text(&mut self, text: impl Into<String>) {
        self.content.push(ContentBlock::text(text));
    }

    /// Encode as one line of the wire protocol (without the newline).
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Internal`] if serialization fails.
    pub fn to_line(&self) -> McpServerResult<String> {
        serde_json::to_string(self).map_err(|e| McpServerError::Internal(e.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl From<McpResponse> for WireResponse {
    fn from(response: McpResponse) -> Self {
        let error = if response.is_error {
            Some(response.error.unwrap_or_else(|| "unknown error".to_string()))
        } else {
            None
        };

        Self {
            content: response.content,
            error,
            request_id: response.request_id,
        }
    }
}

impl From<WireResponse> for McpResponse {
    fn from(wire: WireResponse) -> Self {
        Self {
            is_error: wire.error.is_some(),
            content: wire.content,
            error: wire.error,
            request_id: wire.request_id,
        }
    }
}

/// Content block in responses and tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },

    /// Image content (base64 data)
    Image { data: String, mime_type: String },

    /// Resource reference
    Resource {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Text of this block, if it is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Tool definition: the static descriptor of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique within a registry)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter schema (JSON Schema)
    pub input_schema: serde_json::Value,

    /// Tool category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ToolDefinition {
    /// Create a new tool definition with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            category: None,
        }
    }

    /// Set the parameter schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Introspection entry returned by schema queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Human-readable description
    pub description: String,

    /// Parameter schema
    pub schema: serde_json::Value,
}

impl From<ToolDefinition> for ToolSchema {
    fn from(definition: ToolDefinition) -> Self {
        Self {
            description: definition.description,
            schema: definition.input_schema,
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content (usually text)
    pub content: Vec<ContentBlock>,

    /// Whether the tool reported a failure
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result with text content.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(content)],
            is_error: false,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }

    /// Create a result with pretty-printed JSON content.
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: false,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Convert into the response sent back to the caller.
    pub fn into_response(self) -> McpResponse {
        if self.is_error {
            McpResponse::error(self.joined_text())
        } else {
            McpResponse::success(self.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_line() {
        let req = McpRequest::from_line(r#"{"tool":"search","params":{"q":"rust"},"request_id":"42"}"#)
            .unwrap();
        assert_eq!(req.tool_name(), "search");
        assert_eq!(req.params()["q"], json!("rust"));
        assert_eq!(req.request_id(), Some("42"));
    }

    #[test]
    fn test_request_defaults() {
        let req = McpRequest::from_line(r#"{"tool":"ping"}"#).unwrap();
        assert!(req.params().is_empty());
        assert_eq!(req.request_id(), None);

        let req = McpRequest::from_line(r#"{"tool":"ping","params":null}"#).unwrap();
        assert!(req.params().is_empty());
    }

    #[test]
    fn test_request_missing_tool_is_decode_error() {
        let err = McpRequest::from_line(r#"{"params":{}}"#).unwrap_err();
        assert!(matches!(err, McpServerError::Decode(_)));
    }

    #[test]
    fn test_request_rejects_bad_shapes() {
        assert!(McpRequest::from_line("not json").is_err());
        assert!(McpRequest::from_line(r#"{"tool":""}"#).is_err());
        assert!(McpRequest::from_line(r#"{"tool":"x","params":[1,2]}"#).is_err());
        assert!(McpRequest::from_line(r#"{"tool":"x","request_id":7}"#).is_err());
    }

    #[test]
    fn test_success_response_wire_shape() {
        let resp = McpResponse::text("hello").with_request_id(Some("r1".to_string()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "hello"}], "request_id": "r1"})
        );
    }

    #[test]
    fn test_error_response_wire_shape() {
        let resp = McpResponse::error("boom");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"content": [], "error": "boom"}));
    }

    #[test]
    fn test_error_message_never_empty() {
        let resp = McpResponse::error("");
        assert!(resp.is_error);
        assert!(!resp.error.unwrap().is_empty());
    }

    #[test]
    fn test_add_text() {
        let mut resp = McpResponse::success(Vec::new());
        resp.add_text("one");
        resp.add_text("two");
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.content[1].as_text(), Some("two"));
    }

    #[test]
    fn test_response_parse_marks_error() {
        let resp: McpResponse =
            serde_json::from_str(r#"{"content":[],"error":"nope","request_id":"9"}"#).unwrap();
        assert!(resp.is_error);
        assert_eq!(resp.request_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_tool_definition() {
        let tool = ToolDefinition::new("search_pages", "Search wiki pages")
            .with_category("search")
            .with_schema(json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }));

        assert_eq!(tool.name, "search_pages");
        let schema = ToolSchema::from(tool);
        assert_eq!(schema.description, "Search wiki pages");
        assert_eq!(schema.schema["required"][0], "query");
    }

    #[test]
    fn test_tool_result_into_response() {
        let ok = ToolResult::text("Success").into_response();
        assert!(!ok.is_error);
        assert_eq!(ok.content.len(), 1);

        let err = ToolResult::error("Something went wrong").into_response();
        assert!(err.is_error);
        assert_eq!(err.error.as_deref(), Some("Something went wrong"));
        assert!(err.content.is_empty());
    }
}
