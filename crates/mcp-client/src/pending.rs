//! Pending-request table shared by all transports.
//!
//! Maps request id to a waiter: a oneshot completion channel plus the
//! start timestamp latency is measured from. Invariants: ids are
//! monotonically increasing per transport instance, no waiter completes
//! more than once, and draining leaves the table empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use tokio::sync::{oneshot, Mutex};

use crate::error::TransportError;
use crate::protocol::JsonRpcResponse;

/// What a waiter eventually receives: the matched response or a
/// transport error, plus the observed latency in milliseconds.
pub type Completion = (Result<JsonRpcResponse, TransportError>, f64);

struct Waiter {
    tx: oneshot::Sender<Completion>,
    started: Instant,
}

/// Id allocation plus the id -> waiter map.
pub struct PendingTable {
    next_id: AtomicI64,
    waiters: Mutex<HashMap<i64, Waiter>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh id and register its waiter. The returned
    /// receiver fires exactly once. Registration happens before the
    /// outbound write so an immediate response cannot be lost.
    pub async fn register(&self) -> (i64, oneshot::Receiver<Completion>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            tx,
            started: Instant::now(),
        };
        self.waiters.lock().await.insert(id, waiter);
        (id, rx)
    }

    /// Complete the waiter for `resp.id` with a matched response.
    /// Returns false when no waiter was registered for that id.
    pub async fn complete(&self, resp: JsonRpcResponse) -> bool {
        let waiter = self.waiters.lock().await.remove(&resp.id);
        match waiter {
            Some(w) => {
                let latency = w.started.elapsed().as_secs_f64() * 1_000.0;
                let _ = w.tx.send((Ok(resp), latency));
                true
            }
            None => false,
        }
    }

    /// Reject a single waiter, e.g. when its outbound write failed.
    pub async fn fail(&self, id: i64, err: TransportError) {
        if let Some(w) = self.waiters.lock().await.remove(&id) {
            let latency = w.started.elapsed().as_secs_f64() * 1_000.0;
            let _ = w.tx.send((Err(err), latency));
        }
    }

    /// Remove a waiter without completing it. The requester calls this
    /// after its own deadline fired, so nothing is listening anymore.
    pub async fn forget(&self, id: i64) {
        self.waiters.lock().await.remove(&id);
    }

    /// Reject every outstanding waiter; used on close and when a
    /// response stream ends. Leaves the table empty.
    pub async fn drain(&self, make_err: impl Fn() -> TransportError) {
        let drained: Vec<(i64, Waiter)> = self.waiters.lock().await.drain().collect();
        for (_, w) in drained {
            let latency = w.started.elapsed().as_secs_f64() * 1_000.0;
            let _ = w.tx.send((Err(make_err()), latency));
        }
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(id: i64) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let table = PendingTable::new();
        let (a, _rx_a) = table.register().await;
        let (b, _rx_b) = table.register().await;
        let (c, _rx_c) = table.register().await;
        assert!(a < b && b < c);
        assert!(a >= 1);
    }

    #[tokio::test]
    async fn complete_fires_waiter_once() {
        let table = PendingTable::new();
        let (id, rx) = table.register().await;
        assert!(table.complete(resp(id)).await);
        let (result, latency) = rx.await.unwrap();
        assert_eq!(result.unwrap().id, id);
        assert!(latency >= 0.0);
        // A second completion for the same id finds no waiter.
        assert!(!table.complete(resp(id)).await);
    }

    #[tokio::test]
    async fn unknown_id_is_not_matched() {
        let table = PendingTable::new();
        let (_id, _rx) = table.register().await;
        assert!(!table.complete(resp(9999)).await);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn fail_rejects_single_waiter() {
        let table = PendingTable::new();
        let (id, rx) = table.register().await;
        table.fail(id, TransportError::Network("reset".into())).await;
        let (result, _latency) = rx.await.unwrap();
        assert!(matches!(result, Err(TransportError::Network(_))));
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn drain_empties_table_and_rejects_all() {
        let table = PendingTable::new();
        let (_a, rx_a) = table.register().await;
        let (_b, rx_b) = table.register().await;
        table.drain(|| TransportError::Closing).await;
        assert_eq!(table.len().await, 0);
        for rx in [rx_a, rx_b] {
            let (result, _latency) = rx.await.unwrap();
            assert!(matches!(result, Err(TransportError::Closing)));
        }
    }

    #[tokio::test]
    async fn forget_leaves_no_waiter() {
        let table = PendingTable::new();
        let (id, rx) = table.register().await;
        table.forget(id).await;
        assert_eq!(table.len().await, 0);
        drop(table);
        // The receiver observes channel closure, not a completion.
        assert!(rx.await.is_err());
    }
}
