//! JSON-RPC 2.0 types for the MCP protocol.
//!
//! Each message is a single JSON object; framing (lines, SSE events)
//! belongs to the transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Client identity sent during `initialize`.
pub const CLIENT_NAME: &str = "mcp-stress";
pub const CLIENT_VERSION: &str = "0.1.0";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 request (has an `id` — expects a response).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no `id` — fire-and-forget).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC "method not found"; diagnose uses it to mark optional
/// capabilities as skipped rather than failed.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Incoming classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message arriving from the server, classified by shape: responses
/// carry an `id`, server-initiated notifications carry a `method` and
/// no `id`.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Classify a parsed JSON value. Returns `None` for shapes this
    /// client never produces requests for (server-initiated requests,
    /// batches).
    pub fn classify(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            serde_json::from_value(Value::Object(obj.clone()))
                .ok()
                .map(IncomingMessage::Response)
        } else if obj.contains_key("method") && !obj.contains_key("id") {
            serde_json::from_value(Value::Object(obj.clone()))
                .ok()
                .map(IncomingMessage::Notification)
        } else {
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client info sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

/// Build the frozen `initialize` parameters.
pub fn initialize_params() -> InitializeParams {
    InitializeParams {
        protocol_version: PROTOCOL_VERSION.into(),
        capabilities: serde_json::json!({}),
        client_info: ClientInfo {
            name: CLIENT_NAME.into(),
            version: CLIENT_VERSION.into(),
        },
    }
}

/// Server identity from the `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// The result payload of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: ServerInfo,
}

/// A single tool definition returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// The result payload from `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDef>,
}

/// A single content item in a `tools/call` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// The result payload from `tools/call`.
///
/// `isError: true` is a logical failure even though the transport call
/// succeeded; the engine records it as such with the latency preserved.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    #[serde(default)]
    #[serde(rename = "isError")]
    pub is_error: bool,
}

/// A resource listed by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDef {
    pub uri: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesListResult {
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
}

/// A resource template listed by `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDef {
    pub uri_template: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesTemplatesListResult {
    #[serde(default)]
    pub resource_templates: Vec<ResourceTemplateDef>,
}

/// A prompt argument descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// A prompt listed by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsListResult {
    #[serde(default)]
    pub prompts: Vec<PromptDef>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request() {
        let req = JsonRpcRequest::new(1, "initialize", Some(serde_json::json!({"a": 1})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn serialize_request_without_params() {
        let req = JsonRpcRequest::new(2, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("params"));
    }

    #[test]
    fn serialize_notification_has_no_id() {
        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&notif).unwrap();
        assert!(json.contains("\"method\":\"notifications/initialized\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn classify_response() {
        let v: Value =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#).unwrap();
        match IncomingMessage::classify(v) {
            Some(IncomingMessage::Response(resp)) => {
                assert_eq!(resp.id, 7);
                assert!(!resp.is_error());
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn classify_error_response() {
        let v: Value = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32603,"message":"internal"}}"#,
        )
        .unwrap();
        match IncomingMessage::classify(v) {
            Some(IncomingMessage::Response(resp)) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, -32603);
                assert_eq!(err.message, "internal");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let v: Value = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"n":1}}"#,
        )
        .unwrap();
        match IncomingMessage::classify(v) {
            Some(IncomingMessage::Notification(n)) => {
                assert_eq!(n.method, "notifications/progress");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn classify_rejects_server_requests() {
        // Has both id and method but no result/error: a server-initiated
        // request, which this client never answers.
        let v: Value = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"sampling/createMessage"}"#,
        )
        .unwrap();
        assert_eq!(IncomingMessage::classify(v), None);
    }

    #[test]
    fn initialize_params_are_frozen() {
        let params = initialize_params();
        assert_eq!(params.protocol_version, "2025-03-26");
        assert_eq!(params.client_info.name, "mcp-stress");
        assert_eq!(params.client_info.version, "0.1.0");
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("protocolVersion").is_some());
        assert!(json.get("clientInfo").is_some());
    }

    #[test]
    fn tool_call_result_is_error_flag() {
        let raw = r#"{"content":[{"type":"text","text":"boom"}],"isError":true}"#;
        let result: ToolCallResult = serde_json::from_str(raw).unwrap();
        assert!(result.is_error);
        let raw_ok = r#"{"content":[{"type":"text","text":"fine"}]}"#;
        let result: ToolCallResult = serde_json::from_str(raw_ok).unwrap();
        assert!(!result.is_error);
    }

    #[test]
    fn tools_list_defaults_schema() {
        let raw = r#"{"tools":[{"name":"ping_tool"}]}"#;
        let result: ToolsListResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.tools[0].name, "ping_tool");
        assert!(result.tools[0].input_schema.get("type").is_some());
    }

    #[test]
    fn resource_templates_use_camel_case() {
        let raw = r#"{"resourceTemplates":[{"uriTemplate":"file:///{path}"}]}"#;
        let result: ResourcesTemplatesListResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.resource_templates[0].uri_template, "file:///{path}");
    }
}
