//! Fixed-duration windowing for charts and the live dashboard.
//!
//! The window width is coarsened with run duration so a chart lands on
//! roughly 30-60 buckets. Every slot is emitted, including empty ones,
//! to keep bar widths uniform; empty windows carry the last-observed
//! concurrency forward.

use serde::{Deserialize, Serialize};

use stress_domain::events::RequestEvent;

use crate::percentile::percentile;

/// Number of leading windows exempt from anomaly detection.
const ANOMALY_WARMUP_WINDOWS: usize = 10;

/// Anomaly trigger: window p99 above this multiple of the rolling mean.
const ANOMALY_FACTOR: f64 = 3.0;

/// Per-window aggregate, also the payload of the dashboard `window` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowStat {
    /// Window start, milliseconds since run start.
    pub t: u64,
    pub count: u64,
    pub errors: u64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
}

/// Prepared chart data: what the static chart renders and what the
/// dashboard sends in its `complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedChart {
    pub window_ms: u64,
    pub windows: Vec<WindowStat>,
    /// Indices into `windows` flagged by the anomaly rule.
    pub anomalies: Vec<u32>,
}

/// Pick the window width for a run duration. The thresholds are part of
/// the format: a file round-trip must produce identical bucketing.
pub fn pick_window_ms(duration_ms: u64) -> u64 {
    if duration_ms <= 60_000 {
        1_000
    } else if duration_ms <= 300_000 {
        5_000
    } else if duration_ms <= 600_000 {
        10_000
    } else {
        30_000
    }
}

/// Bucket request events into uniform windows and run anomaly detection.
///
/// `duration_ms` is normally the summary's `durationMs` (the last
/// record's `t`); events beyond it still land in a final window.
pub fn build_chart(events: &[RequestEvent], duration_ms: u64) -> PreparedChart {
    let window_ms = pick_window_ms(duration_ms);
    let slot_count = (duration_ms / window_ms + 1) as usize;

    let mut latencies: Vec<Vec<f64>> = vec![Vec::new(); slot_count];
    let mut errors = vec![0u64; slot_count];
    let mut concurrency: Vec<Option<u32>> = vec![None; slot_count];

    for ev in events {
        let slot = ((ev.t / window_ms) as usize).min(slot_count - 1);
        latencies[slot].push(ev.latency_ms);
        if !ev.ok {
            errors[slot] += 1;
        }
        if ev.concurrency.is_some() {
            concurrency[slot] = ev.concurrency;
        }
    }

    let mut windows = Vec::with_capacity(slot_count);
    let mut carried: Option<u32> = None;
    for slot in 0..slot_count {
        let mut sorted = std::mem::take(&mut latencies[slot]);
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if concurrency[slot].is_some() {
            carried = concurrency[slot];
        }
        windows.push(WindowStat {
            t: slot as u64 * window_ms,
            count: sorted.len() as u64,
            errors: errors[slot],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            concurrency: carried,
        });
        latencies[slot] = sorted;
    }

    let anomalies = detect_anomalies(&windows, &latencies);

    PreparedChart {
        window_ms,
        windows,
        anomalies,
    }
}

/// Flag windows whose p99 exceeds [`ANOMALY_FACTOR`] times the mean
/// latency of the previous [`ANOMALY_WARMUP_WINDOWS`] windows.
fn detect_anomalies(windows: &[WindowStat], latencies: &[Vec<f64>]) -> Vec<u32> {
    let mut anomalies = Vec::new();
    for idx in ANOMALY_WARMUP_WINDOWS..windows.len() {
        let (mut sum, mut count) = (0.0f64, 0u64);
        for prev in idx - ANOMALY_WARMUP_WINDOWS..idx {
            sum += latencies[prev].iter().sum::<f64>();
            count += latencies[prev].len() as u64;
        }
        if count == 0 {
            continue;
        }
        let rolling_mean = sum / count as f64;
        if rolling_mean > 0.0 && windows[idx].p99 > ANOMALY_FACTOR * rolling_mean {
            anomalies.push(idx as u32);
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(t: u64, latency_ms: f64, ok: bool, concurrency: Option<u32>) -> RequestEvent {
        RequestEvent {
            t,
            method: "ping".into(),
            latency_ms,
            ok,
            error: None,
            error_category: None,
            error_code: None,
            concurrency,
            phase: None,
        }
    }

    #[test]
    fn window_width_thresholds() {
        assert_eq!(pick_window_ms(10_000), 1_000);
        assert_eq!(pick_window_ms(60_000), 1_000);
        assert_eq!(pick_window_ms(60_001), 5_000);
        assert_eq!(pick_window_ms(300_000), 5_000);
        assert_eq!(pick_window_ms(400_000), 10_000);
        assert_eq!(pick_window_ms(700_000), 30_000);
    }

    #[test]
    fn empty_windows_are_emitted() {
        let events = vec![ev(100, 5.0, true, Some(2)), ev(4_500, 7.0, true, Some(2))];
        let chart = build_chart(&events, 5_000);
        assert_eq!(chart.window_ms, 1_000);
        assert_eq!(chart.windows.len(), 6);
        assert_eq!(chart.windows[0].count, 1);
        assert_eq!(chart.windows[1].count, 0);
        assert_eq!(chart.windows[4].count, 1);
    }

    #[test]
    fn concurrency_carries_forward_into_empty_windows() {
        let events = vec![ev(100, 5.0, true, Some(8))];
        let chart = build_chart(&events, 3_000);
        assert_eq!(chart.windows[0].concurrency, Some(8));
        assert_eq!(chart.windows[2].concurrency, Some(8));
    }

    #[test]
    fn errors_counted_per_window() {
        let events = vec![
            ev(10, 5.0, true, None),
            ev(20, 5.0, false, None),
            ev(1_010, 5.0, false, None),
        ];
        let chart = build_chart(&events, 2_000);
        assert_eq!(chart.windows[0].errors, 1);
        assert_eq!(chart.windows[1].errors, 1);
    }

    #[test]
    fn anomaly_flagged_after_warmup() {
        // 12 windows of steady 10ms latencies, then one with a 100ms p99.
        let mut events = Vec::new();
        for w in 0..12u64 {
            for i in 0..10u64 {
                events.push(ev(w * 1_000 + i * 50, 10.0, true, None));
            }
        }
        events.push(ev(12_000, 100.0, true, None));
        let chart = build_chart(&events, 12_500);
        assert!(chart.anomalies.contains(&12));
    }

    #[test]
    fn no_anomalies_on_flat_latency() {
        let mut events = Vec::new();
        for w in 0..20u64 {
            events.push(ev(w * 1_000, 10.0, true, None));
        }
        let chart = build_chart(&events, 20_000);
        assert!(chart.anomalies.is_empty());
    }
}
