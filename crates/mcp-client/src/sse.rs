//! Legacy SSE transport.
//!
//! Two-URL dance: GET the configured URL as a long-lived event stream,
//! wait for an `endpoint` event naming the POST URL, then keep reading
//! the stream in the background. Every request POSTs to the endpoint;
//! the matching response travels back on the stream. Session identity
//! lives inside the endpoint URL, so no extra header is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::{RequestFailure, TransportError};
use crate::pending::PendingTable;
use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcRequest};
use crate::sse_parser::SseParser;
use crate::transport::{
    await_reply, build_header_map, dispatch_notification, McpTransport, NotificationSender, Reply,
};

/// Configuration for a legacy SSE session.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// The SSE stream URL (the one you GET).
    pub url: String,
    /// User-supplied headers, passed on every HTTP call.
    pub headers: Vec<(String, String)>,
    /// Per-request deadline; also bounds endpoint discovery.
    pub timeout: Duration,
}

/// Legacy SSE transport.
pub struct SseTransport {
    config: SseConfig,
    client: reqwest::Client,
    pending: Arc<PendingTable>,
    endpoint: parking_lot::Mutex<Option<Url>>,
    notify: Arc<parking_lot::Mutex<Option<NotificationSender>>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl SseTransport {
    pub fn new(config: SseConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            pending: Arc::new(PendingTable::new()),
            endpoint: parking_lot::Mutex::new(None),
            notify: Arc::new(parking_lot::Mutex::new(None)),
            reader: parking_lot::Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Dispatch one `message` event payload into the pending table or
    /// the notification handler.
    async fn dispatch_payload(
        pending: &PendingTable,
        notify: &parking_lot::Mutex<Option<NotificationSender>>,
        data: &str,
    ) {
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "SSE message with malformed JSON payload");
                return;
            }
        };
        match IncomingMessage::classify(value) {
            Some(IncomingMessage::Response(resp)) => {
                let id = resp.id;
                if !pending.complete(resp).await {
                    tracing::warn!(id, "SSE response with no pending request");
                }
            }
            Some(IncomingMessage::Notification(n)) => dispatch_notification(notify, n),
            None => tracing::debug!("skipping unhandled SSE message shape"),
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let base = Url::parse(&self.config.url)
            .map_err(|e| TransportError::Client(format!("invalid SSE URL: {e}")))?;
        let headers = build_header_map(&self.config.headers)?;

        let response = self
            .client
            .get(base.clone())
            .headers(headers)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(TransportError::Protocol(format!(
                "SSE stream returned HTTP {}",
                response.status()
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(TransportError::Protocol(format!(
                "unexpected Content-Type on SSE stream: {content_type:?}"
            )));
        }

        // Read until the endpoint event arrives; everything the server
        // sends before that is unexpected but harmless.
        let mut response = response;
        let mut parser = SseParser::new();
        let endpoint = tokio::time::timeout(self.config.timeout, async {
            loop {
                let chunk = response
                    .chunk()
                    .await
                    .map_err(TransportError::from_reqwest)?;
                let Some(bytes) = chunk else {
                    return Err(TransportError::Protocol(
                        "SSE stream ended before endpoint event".into(),
                    ));
                };
                for event in parser.push(&String::from_utf8_lossy(&bytes)) {
                    if event.name() == "endpoint" {
                        return resolve_endpoint(&base, event.data.trim());
                    }
                    tracing::debug!(event = %event.name(), "event before endpoint, ignoring");
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout)??;

        tracing::debug!(endpoint = %endpoint, "SSE endpoint discovered");
        *self.endpoint.lock() = Some(endpoint);

        // Keep reading the same stream in the background: every
        // `message` event is a reply or a server notification.
        let pending = Arc::clone(&self.pending);
        let notify = Arc::clone(&self.notify);
        let closed = Arc::clone(&self.closed);
        let reader = tokio::spawn(async move {
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        for event in parser.push(&String::from_utf8_lossy(&bytes)) {
                            if event.name() == "message" {
                                Self::dispatch_payload(&pending, &notify, &event.data).await;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "SSE stream error");
                        break;
                    }
                }
            }
            if let Some(event) = parser.finish() {
                if event.name() == "message" {
                    Self::dispatch_payload(&pending, &notify, &event.data).await;
                }
            }
            if !closed.load(Ordering::SeqCst) {
                pending
                    .drain(|| TransportError::Protocol("SSE stream ended".into()))
                    .await;
            }
        });
        *self.reader.lock() = Some(reader);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Reply, RequestFailure> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RequestFailure::immediate(TransportError::Closed));
        }
        let endpoint = match self.endpoint.lock().clone() {
            Some(url) => url,
            None => {
                return Err(RequestFailure::immediate(TransportError::Client(
                    "transport not connected".into(),
                )))
            }
        };
        let headers = build_header_map(&self.config.headers)
            .map_err(RequestFailure::immediate)?;

        let (id, rx) = self.pending.register().await;
        let req = JsonRpcRequest::new(id, method, params);

        // The real response arrives on the SSE stream; the POST body is
        // drained and discarded.
        let post = self
            .client
            .post(endpoint)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await;
        match post {
            Ok(response) => {
                let status = response.status();
                let _ = response.bytes().await;
                if !status.is_success() {
                    self.pending
                        .fail(id, TransportError::Protocol(format!("POST returned HTTP {status}")))
                        .await;
                }
            }
            Err(e) => {
                self.pending.fail(id, TransportError::from_reqwest(e)).await;
            }
        }

        await_reply(&self.pending, id, rx, self.config.timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let endpoint = self
            .endpoint
            .lock()
            .clone()
            .ok_or_else(|| TransportError::Client("transport not connected".into()))?;
        let headers = build_header_map(&self.config.headers)?;
        let notif = JsonRpcNotification::new(method, params);
        let response = self
            .client
            .post(endpoint)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .json(&notif)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let _ = response.bytes().await;
        Ok(())
    }

    fn set_notification_handler(&self, tx: NotificationSender) {
        *self.notify.lock() = Some(tx);
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.drain(|| TransportError::Closing).await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Resolve the endpoint event's data against the stream URL and verify
/// the origin matches; a cross-origin endpoint is a protocol error.
fn resolve_endpoint(base: &Url, data: &str) -> Result<Url, TransportError> {
    let endpoint = base
        .join(data)
        .map_err(|e| TransportError::Protocol(format!("invalid endpoint URL {data:?}: {e}")))?;
    let same_origin = endpoint.scheme() == base.scheme()
        && endpoint.host_str() == base.host_str()
        && endpoint.port_or_known_default() == base.port_or_known_default();
    if !same_origin {
        return Err(TransportError::Protocol(format!(
            "endpoint origin {} does not match stream origin {}",
            endpoint, base
        )));
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_endpoint_resolves_against_stream_url() {
        let base = Url::parse("http://localhost:8080/sse").unwrap();
        let ep = resolve_endpoint(&base, "/messages?sessionId=abc123").unwrap();
        assert_eq!(ep.as_str(), "http://localhost:8080/messages?sessionId=abc123");
    }

    #[test]
    fn absolute_same_origin_endpoint_is_accepted() {
        let base = Url::parse("https://example.com/sse").unwrap();
        let ep = resolve_endpoint(&base, "https://example.com/messages").unwrap();
        assert_eq!(ep.path(), "/messages");
    }

    #[test]
    fn cross_origin_endpoint_is_rejected() {
        let base = Url::parse("https://example.com/sse").unwrap();
        let err = resolve_endpoint(&base, "https://evil.example.net/messages").unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn default_port_counts_as_same_origin() {
        let base = Url::parse("https://example.com/sse").unwrap();
        assert!(resolve_endpoint(&base, "https://example.com:443/messages").is_ok());
    }
}
