//! NDJSON event model.
//!
//! One run produces one NDJSON file: a `meta` line first, zero or more
//! per-request events (no `type` tag) in arrival order, and a `summary`
//! line last when the run completed. These structs are the on-disk
//! format; field names and shapes are frozen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::ErrorCategory;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hot-path record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw record produced on the hot path. Integer-only; the Aggregator
/// resolves method names and error messages at serialisation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    /// Milliseconds since run start (monotonic, truncated).
    pub t: u64,
    /// Interned method handle.
    pub method_id: u16,
    /// Observed latency, rounded to two decimals at record time.
    pub latency_ms: f64,
    /// Outcome.
    pub ok: bool,
    /// 0 for success, 1..5 per [`ErrorCategory::as_int`].
    pub category: u8,
    /// JSON-RPC error code, or -1.
    pub code: i64,
    /// Target concurrency in force when the request was issued; 0 if untracked.
    pub concurrency: u32,
    /// Phase index for find-ceiling runs; -1 otherwise.
    pub phase: i32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// First line of every NDJSON file: the entire run configuration plus a
/// reproduction command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaEvent {
    pub run_id: String,
    /// Wall-clock start, RFC 3339.
    pub started_at: String,
    /// `stdio` | `sse` | `streamable-http`.
    pub transport: String,
    /// Subprocess command line or server URL.
    pub target: String,
    pub profile: String,
    pub shape: String,
    pub duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
    pub concurrency: u32,
    pub timeout_ms: u64,
    pub seed: u32,
    /// Command line that reproduces this run.
    pub command: String,
    /// Present (true) only on cross-run aggregate files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_count: Option<u32>,
}

/// One request outcome. Serialised without a `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub t: u64,
    pub method: String,
    pub latency_ms: f64,
    pub ok: bool,
    /// Last observed message for this (category, code) pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<i32>,
}

/// Latency distribution over a set of requests, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Per-method slice of the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodStats {
    pub method: String,
    pub count: u64,
    pub errors: u64,
    pub stats: LatencyStats,
}

/// One find-ceiling phase as reported in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: u32,
    pub concurrency: u32,
    pub total: u64,
    pub errors: u64,
    pub rps: f64,
    pub p50: f64,
    pub p99: f64,
}

/// Terminal verdict of a find-ceiling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CeilingReport {
    /// Concurrency at which the run ended (previous phase for a plateau).
    pub concurrency: u32,
    /// `plateau` | `degradation` | `error-saturation` | `no-plateau`.
    pub reason: String,
}

/// Last line of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEvent {
    pub total_requests: u64,
    pub total_errors: u64,
    /// The last record's `t`, not wall-clock elapsed. Keeps file
    /// round-trips stable.
    pub duration_ms: u64,
    pub requests_per_second: f64,
    pub overall: LatencyStats,
    pub by_method: Vec<MethodStats>,
    /// Histogram keyed by category wire string; only non-zero entries.
    pub error_categories: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<CeilingReport>,
}

impl SummaryEvent {
    /// Summary for a run that recorded nothing.
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            duration_ms: 0,
            requests_per_second: 0.0,
            overall: LatencyStats::default(),
            by_method: Vec::new(),
            error_categories: BTreeMap::new(),
            phases: Vec::new(),
            ceiling: None,
        }
    }

    /// Per-run error rate in percent; 0 for empty runs.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_requests as f64 * 100.0
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cross-run aggregate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mean and sample standard deviation of one metric across runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregateStat {
    pub mean: f64,
    pub stddev: f64,
}

/// Aggregate of each latency-stats field across runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AggregateLatencyStats {
    pub min: AggregateStat,
    pub max: AggregateStat,
    pub mean: AggregateStat,
    pub p50: AggregateStat,
    pub p95: AggregateStat,
    pub p99: AggregateStat,
}

/// Cross-run summary produced by `--repeat` and `aggregate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub run_count: u32,
    pub duration_ms: AggregateStat,
    pub total_requests: AggregateStat,
    pub requests_per_second: AggregateStat,
    pub total_errors: AggregateStat,
    /// Per-run `totalErrors / totalRequests · 100`, then aggregated.
    pub error_rate: AggregateStat,
    pub overall: AggregateLatencyStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_event_omits_absent_fields() {
        let ev = RequestEvent {
            t: 12,
            method: "ping".into(),
            latency_ms: 1.5,
            ok: true,
            error: None,
            error_category: None,
            error_code: None,
            concurrency: Some(4),
            phase: None,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("phase"));
        assert!(!json.contains("type"));
        assert!(json.contains("\"concurrency\":4"));
    }

    #[test]
    fn request_event_roundtrip_with_error() {
        let ev = RequestEvent {
            t: 99,
            method: "tools/call:search".into(),
            latency_ms: 250.25,
            ok: false,
            error: Some("internal".into()),
            error_category: Some(ErrorCategory::Server),
            error_code: Some(-32603),
            concurrency: Some(10),
            phase: Some(2),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"errorCategory\":\"server\""));
        let back: RequestEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn empty_summary_is_all_zeros() {
        let s = SummaryEvent::empty();
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.requests_per_second, 0.0);
        assert_eq!(s.error_rate(), 0.0);
    }

    #[test]
    fn summary_uses_camel_case() {
        let s = SummaryEvent::empty();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("totalRequests"));
        assert!(json.contains("requestsPerSecond"));
        assert!(json.contains("byMethod"));
    }
}
