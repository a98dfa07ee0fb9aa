//! The transport capability set shared by stdio, legacy SSE and
//! streamable HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{RequestFailure, TransportError};
use crate::pending::{Completion, PendingTable};
use crate::protocol::JsonRpcNotification;

/// Which wire a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable-http",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful request: the JSON-RPC `result` member plus the latency
/// observed at the transport boundary (outbound write to matching-id
/// parse), in milliseconds.
#[derive(Debug, Clone)]
pub struct Reply {
    pub result: Value,
    pub latency_ms: f64,
}

/// Handler for server-initiated notifications. Routed through a bounded
/// channel so the reader task never blocks on a slow consumer.
pub type NotificationSender = mpsc::Sender<JsonRpcNotification>;

/// Trait for MCP session transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Establish per-session state. Must be called before requests.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send a JSON-RPC request with a fresh id and await its matching
    /// response.
    async fn request(&self, method: &str, params: Option<Value>)
        -> Result<Reply, RequestFailure>;

    /// Send a JSON-RPC notification; no response expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Register the (single) handler for server-initiated notifications.
    fn set_notification_handler(&self, tx: NotificationSender);

    /// Terminate the session, rejecting all pending requests. A second
    /// close is a no-op.
    async fn close(&self);

    /// Observable closed bit.
    fn is_closed(&self) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Await a registered waiter under the per-request deadline and unwrap
/// the JSON-RPC envelope: an `error` member becomes a server failure
/// with the latency preserved.
pub(crate) async fn await_reply(
    pending: &PendingTable,
    id: i64,
    rx: oneshot::Receiver<Completion>,
    timeout: Duration,
) -> Result<Reply, RequestFailure> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok((Ok(resp), latency_ms))) => match resp.error {
            Some(err) => Err(RequestFailure::new(
                TransportError::Server {
                    code: err.code,
                    message: err.message,
                    data: err.data,
                },
                latency_ms,
            )),
            None => Ok(Reply {
                result: resp.result.unwrap_or(Value::Null),
                latency_ms,
            }),
        },
        Ok(Ok((Err(err), latency_ms))) => Err(RequestFailure::new(err, latency_ms)),
        Ok(Err(_)) => {
            // Sender dropped without completing: the transport tore down.
            pending.forget(id).await;
            Err(RequestFailure::immediate(TransportError::Closing))
        }
        Err(_) => {
            pending.forget(id).await;
            Err(RequestFailure::new(
                TransportError::Timeout,
                timeout.as_secs_f64() * 1_000.0,
            ))
        }
    }
}

/// Forward a server notification to the registered handler, if any.
/// `try_send` keeps the reader task from blocking; overflow is dropped
/// with a debug log.
pub(crate) fn dispatch_notification(
    handler: &parking_lot::Mutex<Option<NotificationSender>>,
    notification: JsonRpcNotification,
) {
    let guard = handler.lock();
    match guard.as_ref() {
        Some(tx) => {
            if let Err(e) = tx.try_send(notification) {
                tracing::debug!(error = %e, "dropping server notification, handler full or gone");
            }
        }
        None => {
            tracing::debug!(method = %notification.method, "server notification with no handler");
        }
    }
}

/// Build a reqwest header map from user-supplied `name: value` pairs.
pub(crate) fn build_header_map(
    headers: &[(String, String)],
) -> Result<reqwest::header::HeaderMap, TransportError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError::Client(format!("invalid header name: {key}")))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|_| TransportError::Client(format!("invalid header value for {key}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcResponse;

    #[tokio::test]
    async fn await_reply_unwraps_result() {
        let pending = PendingTable::new();
        let (id, rx) = pending.register().await;
        pending
            .complete(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: Some(serde_json::json!({"tools": []})),
                error: None,
            })
            .await;
        let reply = await_reply(&pending, id, rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(reply.result.get("tools").is_some());
    }

    #[tokio::test]
    async fn await_reply_maps_error_member_to_server_failure() {
        let pending = PendingTable::new();
        let (id, rx) = pending.register().await;
        pending
            .complete(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: None,
                error: Some(crate::protocol::JsonRpcError {
                    code: -32603,
                    message: "internal".into(),
                    data: None,
                }),
            })
            .await;
        let failure = await_reply(&pending, id, rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            TransportError::Server { code: -32603, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn await_reply_times_out_and_forgets() {
        let pending = PendingTable::new();
        let (id, rx) = pending.register().await;
        let failure = await_reply(&pending, id, rx, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransportError::Timeout));
        assert_eq!(failure.latency_ms, 50.0);
        assert_eq!(pending.len().await, 0);
    }

    #[test]
    fn header_map_rejects_bad_names() {
        assert!(build_header_map(&[("x-ok".into(), "1".into())]).is_ok());
        assert!(build_header_map(&[("bad name".into(), "1".into())]).is_err());
    }
}
