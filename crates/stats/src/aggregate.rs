//! Cross-run aggregation: mean and sample standard deviation of the
//! summary scalars and of each overall latency-stats field.

use stress_domain::events::{
    AggregateLatencyStats, AggregateStat, AggregateSummary, SummaryEvent,
};

/// Mean and sample stddev (`n - 1` denominator) of a series.
///
/// A single-element series has stddev 0.
fn stat_of(values: &[f64]) -> AggregateStat {
    if values.is_empty() {
        return AggregateStat::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stddev = if values.len() < 2 {
        0.0
    } else {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    };
    AggregateStat { mean, stddev }
}

/// Combine per-run summaries into the cross-run aggregate.
///
/// `error_rate` is computed per-run before aggregation, so runs with
/// different request counts weigh equally.
pub fn aggregate_summaries(summaries: &[SummaryEvent]) -> AggregateSummary {
    let collect = |f: &dyn Fn(&SummaryEvent) -> f64| -> Vec<f64> {
        summaries.iter().map(f).collect()
    };

    AggregateSummary {
        run_count: summaries.len() as u32,
        duration_ms: stat_of(&collect(&|s| s.duration_ms as f64)),
        total_requests: stat_of(&collect(&|s| s.total_requests as f64)),
        requests_per_second: stat_of(&collect(&|s| s.requests_per_second)),
        total_errors: stat_of(&collect(&|s| s.total_errors as f64)),
        error_rate: stat_of(&collect(&|s| s.error_rate())),
        overall: AggregateLatencyStats {
            min: stat_of(&collect(&|s| s.overall.min)),
            max: stat_of(&collect(&|s| s.overall.max)),
            mean: stat_of(&collect(&|s| s.overall.mean)),
            p50: stat_of(&collect(&|s| s.overall.p50)),
            p95: stat_of(&collect(&|s| s.overall.p95)),
            p99: stat_of(&collect(&|s| s.overall.p99)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stress_domain::events::LatencyStats;

    fn run(total: u64, errors: u64, p99: f64) -> SummaryEvent {
        let mut s = SummaryEvent::empty();
        s.total_requests = total;
        s.total_errors = errors;
        s.duration_ms = 1_000;
        s.requests_per_second = total as f64;
        s.overall = LatencyStats {
            p99,
            ..LatencyStats::default()
        };
        s
    }

    #[test]
    fn mean_and_sample_stddev() {
        let runs = [run(10, 0, 100.0), run(10, 0, 200.0), run(10, 0, 150.0)];
        let agg = aggregate_summaries(&runs);
        assert_eq!(agg.run_count, 3);
        assert_eq!(agg.overall.p99.mean, 150.0);
        assert_eq!(agg.overall.p99.stddev, 50.0);
    }

    #[test]
    fn single_run_has_zero_stddev() {
        let agg = aggregate_summaries(&[run(5, 1, 80.0)]);
        assert_eq!(agg.overall.p99.mean, 80.0);
        assert_eq!(agg.overall.p99.stddev, 0.0);
        assert_eq!(agg.error_rate.mean, 20.0);
    }

    #[test]
    fn error_rate_is_per_run() {
        // 50% and 10% rates average to 30%, regardless of request counts.
        let runs = [run(2, 1, 0.0), run(100, 10, 0.0)];
        let agg = aggregate_summaries(&runs);
        assert_eq!(agg.error_rate.mean, 30.0);
    }

    #[test]
    fn empty_input_is_all_zeros() {
        let agg = aggregate_summaries(&[]);
        assert_eq!(agg.run_count, 0);
        assert_eq!(agg.total_requests.mean, 0.0);
    }
}
