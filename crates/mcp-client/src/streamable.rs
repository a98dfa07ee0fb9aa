//! Streamable HTTP transport (MCP protocol 2025-03-26).
//!
//! Single URL. Every request is a POST accepting both
//! `application/json` and `text/event-stream`; the server answers with
//! a JSON body or an inline SSE stream carrying the single response.
//! The `Mcp-Session-Id` header from the first response is echoed on
//! every later call, and `Close` issues a DELETE with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;

use crate::error::{RequestFailure, TransportError};
use crate::pending::PendingTable;
use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcRequest};
use crate::sse_parser::SseParser;
use crate::transport::{
    await_reply, build_header_map, dispatch_notification, McpTransport, NotificationSender, Reply,
};

/// Session header name fixed by the protocol revision.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Configuration for a streamable-HTTP session.
#[derive(Debug, Clone)]
pub struct StreamableConfig {
    pub url: String,
    /// User-supplied headers, passed on every HTTP call.
    pub headers: Vec<(String, String)>,
    /// Per-request deadline.
    pub timeout: Duration,
}

/// Streamable HTTP transport.
pub struct StreamableTransport {
    config: StreamableConfig,
    client: reqwest::Client,
    pending: Arc<PendingTable>,
    url: parking_lot::Mutex<Option<Url>>,
    session: parking_lot::Mutex<Option<String>>,
    notify: parking_lot::Mutex<Option<NotificationSender>>,
    closed: AtomicBool,
}

impl StreamableTransport {
    pub fn new(config: StreamableConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            pending: Arc::new(PendingTable::new()),
            url: parking_lot::Mutex::new(None),
            session: parking_lot::Mutex::new(None),
            notify: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Session id captured from the first response, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().clone()
    }

    fn base_request(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let headers = build_header_map(&self.config.headers)?;
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(session) = self.session.lock().clone() {
            builder = builder.header(SESSION_HEADER, session);
        }
        Ok(builder)
    }

    fn capture_session(&self, response: &reqwest::Response) {
        if self.session.lock().is_some() {
            return;
        }
        if let Some(value) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            tracing::debug!(session = %value, "captured MCP session id");
            *self.session.lock() = Some(value.to_string());
        }
    }

    /// Consume an inline `text/event-stream` response. Every `message`
    /// event is dispatched: the one matching `want_id` completes our
    /// waiter, everything else is a server notification.
    async fn consume_inline_stream(&self, mut response: reqwest::Response, want_id: i64) {
        let mut parser = SseParser::new();
        let mut completed = false;
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for event in parser.push(&String::from_utf8_lossy(&bytes)) {
                        if event.name() != "message" {
                            continue;
                        }
                        if self.dispatch_stream_payload(&event.data, want_id).await {
                            completed = true;
                        }
                    }
                    // The reply is the only thing we need; stop reading
                    // once it arrived.
                    if completed {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if !completed {
                        self.pending
                            .fail(want_id, TransportError::from_reqwest(e))
                            .await;
                    }
                    return;
                }
            }
        }
        if let Some(event) = parser.finish() {
            if event.name() == "message" && self.dispatch_stream_payload(&event.data, want_id).await
            {
                completed = true;
            }
        }
        if !completed {
            self.pending
                .fail(
                    want_id,
                    TransportError::Protocol("SSE stream ended without a response".into()),
                )
                .await;
        }
    }

    /// Returns true when the payload completed `want_id`.
    async fn dispatch_stream_payload(&self, data: &str, want_id: i64) -> bool {
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                self.pending
                    .fail(want_id, TransportError::Parse(e.to_string()))
                    .await;
                return true;
            }
        };
        match IncomingMessage::classify(value) {
            Some(IncomingMessage::Response(resp)) => {
                let id = resp.id;
                let matched = self.pending.complete(resp).await;
                if !matched {
                    tracing::warn!(id, "inline response with no pending request");
                }
                matched && id == want_id
            }
            Some(IncomingMessage::Notification(n)) => {
                dispatch_notification(&self.notify, n);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl McpTransport for StreamableTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        // The session itself is established lazily: the server assigns
        // Mcp-Session-Id on the first POST (the initialize request).
        let url = Url::parse(&self.config.url)
            .map_err(|e| TransportError::Client(format!("invalid URL: {e}")))?;
        *self.url.lock() = Some(url);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Reply, RequestFailure> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RequestFailure::immediate(TransportError::Closed));
        }
        let url = match self.url.lock().clone() {
            Some(url) => url,
            None => {
                return Err(RequestFailure::immediate(TransportError::Client(
                    "transport not connected".into(),
                )))
            }
        };

        let (id, rx) = self.pending.register().await;
        let req = JsonRpcRequest::new(id, method, params);

        let builder = match self.base_request(reqwest::Method::POST, url) {
            Ok(b) => b,
            Err(e) => {
                self.pending.forget(id).await;
                return Err(RequestFailure::immediate(e));
            }
        };
        let outcome = builder
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await;

        match outcome {
            Ok(response) => {
                self.capture_session(&response);
                let status = response.status();
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                if !status.is_success() {
                    self.pending
                        .fail(
                            id,
                            TransportError::Protocol(format!("POST returned HTTP {status}")),
                        )
                        .await;
                } else if content_type.starts_with("application/json") {
                    match response.bytes().await {
                        Ok(body) => match serde_json::from_slice::<Value>(&body) {
                            Ok(value) => match IncomingMessage::classify(value) {
                                Some(IncomingMessage::Response(resp)) => {
                                    let resp_id = resp.id;
                                    if !self.pending.complete(resp).await || resp_id != id {
                                        self.pending
                                            .fail(
                                                id,
                                                TransportError::Protocol(format!(
                                                    "response for id {resp_id}, expected {id}"
                                                )),
                                            )
                                            .await;
                                    }
                                }
                                Some(IncomingMessage::Notification(n)) => {
                                    dispatch_notification(&self.notify, n);
                                    self.pending
                                        .fail(
                                            id,
                                            TransportError::Protocol(
                                                "JSON body was a notification, not a response"
                                                    .into(),
                                            ),
                                        )
                                        .await;
                                }
                                None => {
                                    self.pending
                                        .fail(
                                            id,
                                            TransportError::Protocol(
                                                "JSON body is not a JSON-RPC message".into(),
                                            ),
                                        )
                                        .await;
                                }
                            },
                            Err(e) => {
                                self.pending
                                    .fail(id, TransportError::Parse(e.to_string()))
                                    .await;
                            }
                        },
                        Err(e) => {
                            self.pending.fail(id, TransportError::from_reqwest(e)).await;
                        }
                    }
                } else if content_type.starts_with("text/event-stream") {
                    // Bound the whole inline read by the request deadline;
                    // the waiter itself fires as soon as the reply lands.
                    let consume = self.consume_inline_stream(response, id);
                    if tokio::time::timeout(self.config.timeout, consume)
                        .await
                        .is_err()
                    {
                        self.pending.fail(id, TransportError::Timeout).await;
                    }
                } else {
                    self.pending
                        .fail(
                            id,
                            TransportError::Protocol(format!(
                                "unexpected Content-Type: {content_type:?}"
                            )),
                        )
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
        let url = self
            .url
            .lock()
            .clone()
            .ok_or_else(|| TransportError::Client("transport not connected".into()))?;
        let notif = JsonRpcNotification::new(method, params);
        let response = self
            .base_request(reqwest::Method::POST, url)?
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(&notif)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        self.capture_session(&response);
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
        let url = self.url.lock().clone();
        if let Some(url) = url {
            // Server rejection of the DELETE is tolerated.
            match self.base_request(reqwest::Method::DELETE, url) {
                Ok(builder) => match builder.send().await {
                    Ok(resp) => tracing::debug!(status = %resp.status(), "session DELETE sent"),
                    Err(e) => tracing::debug!(error = %e, "session DELETE failed"),
                },
                Err(e) => tracing::debug!(error = %e, "could not build session DELETE"),
            }
        }
        self.pending.drain(|| TransportError::Closing).await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
