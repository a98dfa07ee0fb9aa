//! Off-hot-path aggregation worker.
//!
//! A single task owns the method-name map, the error-message
//! dictionary, the in-memory event sequence, the NDJSON writer and the
//! derived counters. The recorder talks to it only through its inbox.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use stress_domain::error::{Error, Result};
use stress_domain::events::{
    CeilingReport, MetaEvent, MethodStats, PhaseReport, RawRecord, RequestEvent, SummaryEvent,
};
use stress_domain::ErrorCategory;
use stress_stats::latency_stats;

/// Byte threshold that forces a writer flush.
const FLUSH_BYTES: usize = 64 * 1024;

/// Time threshold that forces a writer flush.
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Messages accepted on the aggregator inbox.
#[derive(Debug)]
pub enum AggregatorMsg {
    /// A method handle was interned; always precedes records using it.
    Method { id: u16, name: String },
    /// First sighting of a (category, code) pair.
    ErrorMsg {
        category: u8,
        code: i64,
        message: String,
    },
    /// A batch of raw records in arrival order.
    Batch { records: Vec<RawRecord> },
    /// The run completed: write the summary, flush, reply.
    Complete {
        phases: Vec<PhaseReport>,
        ceiling: Option<CeilingReport>,
        ack: oneshot::Sender<Result<RunArtifacts>>,
    },
    /// The run aborted before completing (handshake failure): flush
    /// whatever was written, without a summary line.
    Abandon { ack: oneshot::Sender<()> },
}

/// Everything the engine gets back from a completed run.
#[derive(Debug)]
pub struct RunArtifacts {
    pub summary: SummaryEvent,
    /// Resolved request events in arrival order, for charts.
    pub events: Vec<RequestEvent>,
}

/// Handle to a spawned aggregator task.
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<AggregatorMsg>,
    join: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Spawn the worker. Opens the output file (fatal on failure) and
    /// writes the meta line before anything else.
    pub fn spawn(meta: MetaEvent, out_path: Option<PathBuf>) -> Result<Self> {
        let writer = match &out_path {
            Some(path) => Some(NdjsonWriter::create(path)?),
            None => None,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(run_worker(meta, writer, rx));
        Ok(Self { tx, join })
    }

    pub fn inbox(&self) -> mpsc::UnboundedSender<AggregatorMsg> {
        self.tx.clone()
    }

    /// Complete the run and collect the artifacts.
    pub async fn complete(
        self,
        phases: Vec<PhaseReport>,
        ceiling: Option<CeilingReport>,
    ) -> Result<RunArtifacts> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(AggregatorMsg::Complete {
                phases,
                ceiling,
                ack,
            })
            .map_err(|_| Error::Other("aggregator task is gone".into()))?;
        let artifacts = rx
            .await
            .map_err(|_| Error::Other("aggregator dropped before replying".into()))?;
        let _ = self.join.await;
        artifacts
    }

    /// Abandon the run (no summary line), flushing what exists.
    pub async fn abandon(self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(AggregatorMsg::Abandon { ack }).is_ok() {
            let _ = rx.await;
        }
        let _ = self.join.await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct MethodAcc {
    count: u64,
    errors: u64,
    latencies: Vec<f64>,
}

struct Worker {
    methods: Vec<String>,
    per_method: Vec<MethodAcc>,
    messages: HashMap<(u8, i64), String>,
    events: Vec<RequestEvent>,
    category_counts: [u64; 5],
    all_latencies: Vec<f64>,
    total: u64,
    errors: u64,
    last_t: u64,
    writer: Option<NdjsonWriter>,
    io_error: Option<std::io::Error>,
}

async fn run_worker(
    meta: MetaEvent,
    writer: Option<NdjsonWriter>,
    mut rx: mpsc::UnboundedReceiver<AggregatorMsg>,
) {
    let mut worker = Worker {
        methods: Vec::new(),
        per_method: Vec::new(),
        messages: HashMap::new(),
        events: Vec::new(),
        category_counts: [0; 5],
        all_latencies: Vec::new(),
        total: 0,
        errors: 0,
        last_t: 0,
        writer,
        io_error: None,
    };

    worker.write_tagged("meta", &meta);

    while let Some(msg) = rx.recv().await {
        match msg {
            AggregatorMsg::Method { id, name } => {
                // Ids arrive densely in interning order.
                debug_assert_eq!(id as usize, worker.methods.len());
                worker.methods.push(name);
                worker.per_method.push(MethodAcc::default());
            }
            AggregatorMsg::ErrorMsg {
                category,
                code,
                message,
            } => {
                worker.messages.entry((category, code)).or_insert(message);
            }
            AggregatorMsg::Batch { records } => {
                for record in records {
                    worker.ingest(record);
                }
            }
            AggregatorMsg::Complete {
                phases,
                ceiling,
                ack,
            } => {
                let result = worker.finish(phases, ceiling);
                let _ = ack.send(result);
                return;
            }
            AggregatorMsg::Abandon { ack } => {
                if let Some(w) = worker.writer.as_mut() {
                    if let Err(e) = w.flush() {
                        tracing::warn!(error = %e, "flushing abandoned run output");
                    }
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

impl Worker {
    fn ingest(&mut self, record: RawRecord) {
        let idx = record.method_id as usize;
        debug_assert!(idx < self.methods.len(), "record references unknown method");
        if idx >= self.methods.len() {
            return;
        }

        self.total += 1;
        self.last_t = self.last_t.max(record.t);
        self.all_latencies.push(record.latency_ms);

        let acc = &mut self.per_method[idx];
        acc.count += 1;
        acc.latencies.push(record.latency_ms);

        let mut event = RequestEvent {
            t: record.t,
            method: self.methods[idx].clone(),
            latency_ms: record.latency_ms,
            ok: record.ok,
            error: None,
            error_category: None,
            error_code: None,
            concurrency: (record.concurrency > 0).then_some(record.concurrency),
            phase: (record.phase >= 0).then_some(record.phase),
        };

        if !record.ok {
            self.errors += 1;
            self.per_method[idx].errors += 1;
            if let Some(category) = ErrorCategory::from_int(record.category) {
                self.category_counts[(record.category - 1) as usize] += 1;
                event.error_category = Some(category);
            }
            event.error_code = Some(record.code);
            event.error = self
                .messages
                .get(&(record.category, record.code))
                .cloned();
        }

        self.write_plain(&event);
        self.events.push(event);
    }

    fn finish(
        &mut self,
        phases: Vec<PhaseReport>,
        ceiling: Option<CeilingReport>,
    ) -> Result<RunArtifacts> {
        let summary = self.build_summary(phases, ceiling);
        self.write_tagged("summary", &summary);
        if let Some(w) = self.writer.as_mut() {
            if let Err(e) = w.flush() {
                self.io_error.get_or_insert(e);
            }
        }
        if let Some(e) = self.io_error.take() {
            return Err(Error::Io(e));
        }
        Ok(RunArtifacts {
            summary,
            events: std::mem::take(&mut self.events),
        })
    }

    fn build_summary(
        &self,
        phases: Vec<PhaseReport>,
        ceiling: Option<CeilingReport>,
    ) -> SummaryEvent {
        let by_method: Vec<MethodStats> = self
            .methods
            .iter()
            .zip(&self.per_method)
            .filter(|(_, acc)| acc.count > 0)
            .map(|(name, acc)| MethodStats {
                method: name.clone(),
                count: acc.count,
                errors: acc.errors,
                stats: latency_stats(&acc.latencies),
            })
            .collect();

        let mut error_categories = BTreeMap::new();
        for category in ErrorCategory::all() {
            let count = self.category_counts[(category.as_int() - 1) as usize];
            if count > 0 {
                error_categories.insert(category.as_str().to_string(), count);
            }
        }

        // File-stable throughput: total over the last record's t.
        let requests_per_second = if self.last_t > 0 {
            self.total as f64 / self.last_t as f64 * 1_000.0
        } else {
            0.0
        };

        SummaryEvent {
            total_requests: self.total,
            total_errors: self.errors,
            duration_ms: self.last_t,
            requests_per_second,
            overall: latency_stats(&self.all_latencies),
            by_method,
            error_categories,
            phases,
            ceiling,
        }
    }

    /// Write an event carrying a `type` tag.
    fn write_tagged<T: serde::Serialize>(&mut self, tag: &str, payload: &T) {
        let Ok(mut value) = serde_json::to_value(payload) else {
            debug_assert!(false, "unserialisable aggregator payload");
            return;
        };
        if let Some(obj) = value.as_object_mut() {
            obj.insert("type".into(), serde_json::Value::String(tag.into()));
        }
        self.write_value(&value);
    }

    /// Write a per-request event (no `type` tag).
    fn write_plain<T: serde::Serialize>(&mut self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.write_value(&value),
            Err(_) => debug_assert!(false, "unserialisable request event"),
        }
    }

    fn write_value(&mut self, value: &serde_json::Value) {
        if self.io_error.is_some() {
            return;
        }
        if let Some(w) = self.writer.as_mut() {
            if let Err(e) = w.write_line(value) {
                tracing::error!(error = %e, "NDJSON write failed, output is incomplete");
                self.io_error = Some(e);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Buffered NDJSON writer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte-buffered line writer that flushes on size or age.
struct NdjsonWriter {
    file: std::fs::File,
    buf: Vec<u8>,
    last_flush: Instant,
}

impl NdjsonWriter {
    fn create(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        Ok(Self {
            file,
            buf: Vec::with_capacity(FLUSH_BYTES),
            last_flush: Instant::now(),
        })
    }

    fn write_line(&mut self, value: &serde_json::Value) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.buf, value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.buf.push(b'\n');
        if self.buf.len() >= FLUSH_BYTES || self.last_flush.elapsed() >= FLUSH_INTERVAL {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.file.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }
}
