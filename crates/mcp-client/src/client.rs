//! Typed MCP operations on top of any transport.
//!
//! The client owns the handshake and exposes one method per supported
//! MCP operation. Results come back with the transport-observed latency
//! so callers never measure themselves.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{RequestFailure, TransportError};
use crate::protocol::{
    self, InitializeResult, PromptsListResult, ResourcesListResult, ResourcesTemplatesListResult,
    ServerInfo, ToolCallResult, ToolsListResult, PROTOCOL_VERSION,
};
use crate::transport::{McpTransport, Reply};

/// Outcome of the MCP handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub latency_ms: f64,
    pub result: InitializeResult,
}

/// A connected MCP session: one transport plus the negotiated state.
pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    negotiated: parking_lot::Mutex<Option<InitializeResult>>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn McpTransport>) -> Self {
        Self {
            transport,
            negotiated: parking_lot::Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &Arc<dyn McpTransport> {
        &self.transport
    }

    /// Server identity captured during the handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.negotiated.lock().as_ref().map(|r| r.server_info.clone())
    }

    /// Server capabilities captured during the handshake.
    pub fn server_capabilities(&self) -> Option<Value> {
        self.negotiated.lock().as_ref().map(|r| r.capabilities.clone())
    }

    /// Protocol version the server answered with.
    pub fn protocol_version(&self) -> Option<String> {
        self.negotiated
            .lock()
            .as_ref()
            .map(|r| r.protocol_version.clone())
    }

    /// Perform the MCP handshake: `initialize`, capture the server's
    /// answer, then `notifications/initialized`. A protocol-version
    /// mismatch logs a warning and proceeds.
    pub async fn initialize(&self) -> Result<Handshake, RequestFailure> {
        let params = serde_json::to_value(protocol::initialize_params())
            .map_err(|e| RequestFailure::immediate(TransportError::from_json(e)))?;
        let reply = self.transport.request("initialize", Some(params)).await?;

        let result: InitializeResult = serde_json::from_value(reply.result).map_err(|e| {
            RequestFailure::new(
                TransportError::Parse(format!("initialize result: {e}")),
                reply.latency_ms,
            )
        })?;

        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server_version = %result.protocol_version,
                client_version = PROTOCOL_VERSION,
                "protocol version mismatch, proceeding anyway"
            );
        }
        tracing::debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "MCP handshake complete"
        );

        *self.negotiated.lock() = Some(result.clone());

        self.transport
            .notify("notifications/initialized", None)
            .await
            .map_err(RequestFailure::immediate)?;

        Ok(Handshake {
            latency_ms: reply.latency_ms,
            result,
        })
    }

    pub async fn ping(&self) -> Result<Reply, RequestFailure> {
        self.transport.request("ping", None).await
    }

    pub async fn list_tools(&self) -> Result<(ToolsListResult, f64), RequestFailure> {
        let reply = self.transport.request("tools/list", None).await?;
        parse_reply(reply, "tools/list result")
    }

    /// Call a tool. An `isError: true` result parses fine here; the
    /// caller decides to record it as a logical failure.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<(ToolCallResult, f64), RequestFailure> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let reply = self.transport.request("tools/call", Some(params)).await?;
        parse_reply(reply, "tools/call result")
    }

    pub async fn list_resources(&self) -> Result<(ResourcesListResult, f64), RequestFailure> {
        let reply = self.transport.request("resources/list", None).await?;
        parse_reply(reply, "resources/list result")
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Reply, RequestFailure> {
        let params = serde_json::json!({ "uri": uri });
        self.transport.request("resources/read", Some(params)).await
    }

    pub async fn list_resource_templates(
        &self,
    ) -> Result<(ResourcesTemplatesListResult, f64), RequestFailure> {
        let reply = self
            .transport
            .request("resources/templates/list", None)
            .await?;
        parse_reply(reply, "resources/templates/list result")
    }

    pub async fn list_prompts(&self) -> Result<(PromptsListResult, f64), RequestFailure> {
        let reply = self.transport.request("prompts/list", None).await?;
        parse_reply(reply, "prompts/list result")
    }

    pub async fn get_prompt(&self, name: &str, arguments: Value) -> Result<Reply, RequestFailure> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.transport.request("prompts/get", Some(params)).await
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

/// Deserialize a reply payload, preserving the observed latency on
/// parse failures.
fn parse_reply<T: serde::de::DeserializeOwned>(
    reply: Reply,
    what: &str,
) -> Result<(T, f64), RequestFailure> {
    match serde_json::from_value(reply.result) {
        Ok(parsed) => Ok((parsed, reply.latency_ms)),
        Err(e) => Err(RequestFailure::new(
            TransportError::Parse(format!("{what}: {e}")),
            reply.latency_ms,
        )),
    }
}
