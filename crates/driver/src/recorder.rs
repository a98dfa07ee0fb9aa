//! Hot-path request accounting.
//!
//! The recorder interns method names, appends one latency value and one
//! raw record per request, and hands batches to the aggregator on a
//! fixed cadence. It never serialises and never touches the file.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use stress_domain::events::RawRecord;
use stress_domain::ErrorCategory;
use stress_mcp_client::RequestFailure;

use crate::aggregator::AggregatorMsg;

/// Batch hand-off cadence.
const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Pending-batch size that triggers a backlog warning.
const BACKLOG_WARN: usize = 50_000;

struct HotState {
    methods: HashMap<String, u16>,
    latencies: Vec<f64>,
    pending: Vec<RawRecord>,
    /// (category, code) pairs whose message was already dispatched.
    seen_messages: HashSet<(u8, i64)>,
}

/// Per-run recorder. Cheap to share; all hot-path methods take `&self`.
pub struct Recorder {
    start: Instant,
    total: AtomicU64,
    errors: AtomicU64,
    concurrency: AtomicU32,
    phase: AtomicI32,
    state: parking_lot::Mutex<HotState>,
    inbox: mpsc::UnboundedSender<AggregatorMsg>,
}

impl Recorder {
    pub fn new(inbox: mpsc::UnboundedSender<AggregatorMsg>) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            concurrency: AtomicU32::new(0),
            phase: AtomicI32::new(-1),
            state: parking_lot::Mutex::new(HotState {
                methods: HashMap::new(),
                latencies: Vec::with_capacity(16_384),
                pending: Vec::with_capacity(4_096),
                seen_messages: HashSet::new(),
            }),
            inbox,
        })
    }

    /// Intern a method name. Idempotent; the aggregator learns the
    /// mapping before any record referencing it.
    pub fn register_method(&self, name: &str) -> u16 {
        let mut state = self.state.lock();
        if let Some(&id) = state.methods.get(name) {
            return id;
        }
        let id = state.methods.len() as u16;
        state.methods.insert(name.to_string(), id);
        let _ = self.inbox.send(AggregatorMsg::Method {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Record a successful request.
    pub fn success(&self, method_id: u16, latency_ms: f64) {
        self.push(method_id, latency_ms, true, 0, 0, None);
    }

    /// Record a failed request, classified into (category, code), with
    /// the message dispatched to the aggregator on first sight of the
    /// pair.
    pub fn failure(
        &self,
        method_id: u16,
        latency_ms: f64,
        category: ErrorCategory,
        code: i64,
        message: &str,
    ) {
        self.push(
            method_id,
            latency_ms,
            false,
            category.as_int(),
            code,
            Some(message),
        );
    }

    /// Convenience for transport failures.
    pub fn transport_failure(&self, method_id: u16, failure: &RequestFailure) {
        self.failure(
            method_id,
            failure.latency_ms,
            failure.error.category(),
            failure.error.code(),
            &failure.error.to_string(),
        );
    }

    fn push(
        &self,
        method_id: u16,
        latency_ms: f64,
        ok: bool,
        category: u8,
        code: i64,
        message: Option<&str>,
    ) {
        // One wall-clock read and a two-decimal round per record; the
        // file and all derived stats see the rounded value.
        let t = self.start.elapsed().as_millis() as u64;
        let latency_ms = (latency_ms * 100.0).round() / 100.0;

        let record = RawRecord {
            t,
            method_id,
            latency_ms,
            ok,
            category,
            code,
            concurrency: self.concurrency.load(Ordering::Relaxed),
            phase: self.phase.load(Ordering::Relaxed),
        };

        let mut state = self.state.lock();
        state.latencies.push(latency_ms);
        state.pending.push(record);
        if state.pending.len() >= BACKLOG_WARN && state.pending.len() % BACKLOG_WARN == 0 {
            tracing::warn!(
                pending = state.pending.len(),
                "aggregator is falling behind, record backlog growing"
            );
        }
        if let Some(msg) = message {
            if state.seen_messages.insert((category, code)) {
                let _ = self.inbox.send(AggregatorMsg::ErrorMsg {
                    category,
                    code,
                    message: msg.to_string(),
                });
            }
        }
        drop(state);

        self.total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Publish the target concurrency stamped onto subsequent records.
    pub fn publish_concurrency(&self, concurrency: u32) {
        self.concurrency.store(concurrency, Ordering::Relaxed);
    }

    /// Set the phase index for find-ceiling runs (-1 otherwise).
    pub fn set_phase(&self, phase: i32) {
        self.phase.store(phase, Ordering::Relaxed);
    }

    /// Last published target concurrency.
    pub fn concurrency(&self) -> u32 {
        self.concurrency.load(Ordering::Relaxed)
    }

    /// Current length of the latency vector, for later
    /// [`latencies_since`](Self::latencies_since) calls.
    pub fn latency_count(&self) -> usize {
        self.state.lock().latencies.len()
    }

    /// Latencies recorded since `start_idx`. Copies under the lock;
    /// only called at phase and window boundaries.
    pub fn latencies_since(&self, start_idx: usize) -> Vec<f64> {
        let state = self.state.lock();
        state.latencies[start_idx.min(state.latencies.len())..].to_vec()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Milliseconds since the recorder was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Hand the pending batch to the aggregator.
    pub fn flush(&self) {
        let records = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return;
            }
            std::mem::take(&mut state.pending)
        };
        let _ = self.inbox.send(AggregatorMsg::Batch { records });
    }

    /// Spawn the cadence task; abort it after [`flush`](Self::flush)ing
    /// for the last time.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                recorder.flush();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<AggregatorMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Recorder::new(tx), rx)
    }

    #[tokio::test]
    async fn interning_is_idempotent_and_announced_once() {
        let (rec, mut rx) = recorder();
        let a = rec.register_method("ping");
        let b = rec.register_method("ping");
        let c = rec.register_method("tools/list");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, AggregatorMsg::Method { id, .. } if id == a));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, AggregatorMsg::Method { id, .. } if id == c));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn success_rounds_latency_to_two_decimals() {
        let (rec, mut rx) = recorder();
        let id = rec.register_method("ping");
        let _ = rx.recv().await;
        rec.success(id, 1.23456);
        rec.flush();
        match rx.recv().await.unwrap() {
            AggregatorMsg::Batch { records } => {
                assert_eq!(records[0].latency_ms, 1.23);
                assert!(records[0].ok);
                assert_eq!(records[0].category, 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(rec.total(), 1);
        assert_eq!(rec.errors(), 0);
    }

    #[tokio::test]
    async fn error_message_dispatched_once_per_pair() {
        let (rec, mut rx) = recorder();
        let id = rec.register_method("ping");
        let _ = rx.recv().await;
        rec.failure(id, 2.0, ErrorCategory::Server, -32603, "internal");
        rec.failure(id, 3.0, ErrorCategory::Server, -32603, "internal again");
        rec.failure(id, 4.0, ErrorCategory::Timeout, -1, "deadline");

        let mut error_msgs = 0;
        rec.flush();
        while let Ok(msg) = rx.try_recv() {
            if let AggregatorMsg::ErrorMsg { .. } = msg {
                error_msgs += 1;
            }
        }
        assert_eq!(error_msgs, 2);
        assert_eq!(rec.errors(), 3);
    }

    #[tokio::test]
    async fn latencies_since_returns_tail() {
        let (rec, _rx) = recorder();
        let id = rec.register_method("ping");
        rec.success(id, 1.0);
        rec.success(id, 2.0);
        let mark = rec.latency_count();
        rec.success(id, 3.0);
        rec.success(id, 4.0);
        assert_eq!(rec.latencies_since(mark), vec![3.0, 4.0]);
        assert_eq!(rec.latencies_since(0).len(), 4);
    }

    #[tokio::test]
    async fn concurrency_and_phase_stamped_on_records() {
        let (rec, mut rx) = recorder();
        let id = rec.register_method("ping");
        let _ = rx.recv().await;
        rec.publish_concurrency(7);
        rec.set_phase(3);
        rec.success(id, 1.0);
        rec.flush();
        match rx.recv().await.unwrap() {
            AggregatorMsg::Batch { records } => {
                assert_eq!(records[0].concurrency, 7);
                assert_eq!(records[0].phase, 3);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_on_empty_pending_sends_nothing() {
        let (rec, mut rx) = recorder();
        rec.flush();
        assert!(rx.try_recv().is_err());
    }
}
