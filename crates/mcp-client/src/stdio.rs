//! Stdio transport: spawn a child process and speak line-delimited
//! JSON-RPC over its stdin/stdout.
//!
//! A writer task owns stdin and drains an outgoing channel; a reader
//! task owns stdout and dispatches responses into the pending table.
//! stderr is captured for diagnosis but never interpreted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use async_trait::async_trait;

use crate::error::{RequestFailure, TransportError};
use crate::pending::PendingTable;
use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcRequest};
use crate::transport::{
    await_reply, dispatch_notification, McpTransport, NotificationSender, Reply,
};

/// Capacity of the outgoing-line channel to the writer task.
const OUTGOING_CAPACITY: usize = 128;

/// How many trailing stderr lines are retained for diagnosis.
const STDERR_TAIL_LINES: usize = 40;

/// How long a closing transport waits for the child to exit before
/// killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Configuration for a stdio session.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment on top of the inherited process environment.
    pub env: Vec<(String, String)>,
    /// Per-request deadline.
    pub timeout: Duration,
}

/// Stdio transport over a spawned subprocess.
pub struct StdioTransport {
    config: StdioConfig,
    pending: Arc<PendingTable>,
    outgoing: parking_lot::Mutex<Option<mpsc::Sender<String>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    stderr_tail: Arc<parking_lot::Mutex<VecDeque<String>>>,
    notify: Arc<parking_lot::Mutex<Option<NotificationSender>>>,
    closed: Arc<AtomicBool>,
}

impl StdioTransport {
    pub fn new(config: StdioConfig) -> Self {
        Self {
            config,
            pending: Arc::new(PendingTable::new()),
            outgoing: parking_lot::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            tasks: parking_lot::Mutex::new(Vec::new()),
            stderr_tail: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
            notify: Arc::new(parking_lot::Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Last captured stderr lines, oldest first.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Client(format!("spawning {}: {e}", self.config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Client("failed to capture child stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Client("failed to capture child stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::Client("failed to capture child stderr".into()))?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);

        // Writer task: owns stdin, ends when the channel closes.
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = outgoing_rx.recv().await {
                tracing::trace!(line = %line, "-> server");
                if stdin.write_all(line.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                {
                    tracing::debug!("child stdin closed, writer task ending");
                    break;
                }
            }
        });

        // Reader task: owns stdout, dispatches into the pending table.
        let reader = {
            let pending = Arc::clone(&self.pending);
            let notify = Arc::clone(&self.notify);
            let closed = Arc::clone(&self.closed);
            let mut lines = BufReader::new(stdout).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let value: Value = match serde_json::from_str(trimmed) {
                        Ok(v) => v,
                        Err(_) => {
                            // Startup banners and stray prints land here.
                            tracing::debug!(line = %trimmed, "skipping non-JSON stdout line");
                            continue;
                        }
                    };
                    match IncomingMessage::classify(value) {
                        Some(IncomingMessage::Response(resp)) => {
                            let id = resp.id;
                            if !pending.complete(resp).await {
                                tracing::warn!(id, "response with no pending request");
                            }
                        }
                        Some(IncomingMessage::Notification(n)) => {
                            dispatch_notification(&notify, n);
                        }
                        None => {
                            tracing::debug!(line = %trimmed, "skipping unhandled message shape");
                        }
                    }
                }
                // stdout closed: the child died or is shutting down.
                if !closed.load(Ordering::SeqCst) {
                    pending
                        .drain(|| TransportError::Protocol("server closed stdout".into()))
                        .await;
                }
            })
        };

        // stderr task: keep a short tail for diagnosis.
        let errlog = {
            let tail = Arc::clone(&self.stderr_tail);
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(line = %line, "server stderr");
                    let mut tail = tail.lock();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        };

        *self.outgoing.lock() = Some(outgoing_tx);
        *self.child.lock().await = Some(child);
        self.tasks.lock().extend([writer, reader, errlog]);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Reply, RequestFailure> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RequestFailure::immediate(TransportError::Closed));
        }
        let tx = match self.outgoing.lock().clone() {
            Some(tx) => tx,
            None => {
                return Err(RequestFailure::immediate(TransportError::Client(
                    "transport not connected".into(),
                )))
            }
        };

        let (id, rx) = self.pending.register().await;
        let req = JsonRpcRequest::new(id, method, params);
        let json = match serde_json::to_string(&req) {
            Ok(j) => j,
            Err(e) => {
                self.pending.forget(id).await;
                return Err(RequestFailure::immediate(TransportError::Client(
                    format!("serializing request: {e}"),
                )));
            }
        };
        if tx.send(json).await.is_err() {
            self.pending.forget(id).await;
            return Err(RequestFailure::immediate(TransportError::Client(
                "writer task is gone".into(),
            )));
        }
        await_reply(&self.pending, id, rx, self.config.timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let tx = self
            .outgoing
            .lock()
            .clone()
            .ok_or_else(|| TransportError::Client("transport not connected".into()))?;
        let notif = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notif).map_err(TransportError::from_json)?;
        tx.send(json)
            .await
            .map_err(|_| TransportError::Client("writer task is gone".into()))
    }

    fn set_notification_handler(&self, tx: NotificationSender) {
        *self.notify.lock() = Some(tx);
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.drain(|| TransportError::Closing).await;

        // Dropping the sender ends the writer task, which closes stdin:
        // the polite shutdown signal for a stdio server.
        self.outgoing.lock().take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(?status, "server process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "error waiting for server process");
                }
                Err(_) => {
                    tracing::debug!("server process did not exit in time, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill server process");
                    }
                }
            }
        }

        // Join the I/O tasks; they end once the pipes close.
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
