//! The `compare` subcommand: diff two recorded runs and flag
//! regressions by relative change.

use std::path::Path;

use stress_domain::error::Result;
use stress_domain::events::SummaryEvent;

use crate::ndjson;

/// Latency increase that counts as a regression.
const LATENCY_REGRESSION: f64 = 0.10;

/// Throughput drop that counts as a regression.
const RPS_REGRESSION: f64 = 0.10;

/// Compare two runs; exit 1 when the current run regressed.
pub fn run(baseline: &Path, current: &Path) -> Result<i32> {
    let (_base_meta, base) = ndjson::read_completed(baseline)?;
    let (_cur_meta, cur) = ndjson::read_completed(current)?;

    println!();
    println!(
        "  {:<14} {:>12} {:>12} {:>9}",
        "metric", "baseline", "current", "change"
    );
    let mut regressions: Vec<String> = Vec::new();

    let mut row = |name: &str, base_v: f64, cur_v: f64, worse_when_higher: bool| {
        let change = relative_change(base_v, cur_v);
        println!(
            "  {:<14} {:>12.2} {:>12.2} {:>8.1}%",
            name,
            base_v,
            cur_v,
            change * 100.0
        );
        let threshold = if worse_when_higher {
            LATENCY_REGRESSION
        } else {
            RPS_REGRESSION
        };
        let regressed = if worse_when_higher {
            change > threshold
        } else {
            change < -threshold
        };
        if regressed {
            regressions.push(format!("{name} {:+.1}%", change * 100.0));
        }
    };

    row("rps", base.requests_per_second, cur.requests_per_second, false);
    row("p50", base.overall.p50, cur.overall.p50, true);
    row("p95", base.overall.p95, cur.overall.p95, true);
    row("p99", base.overall.p99, cur.overall.p99, true);
    row("mean", base.overall.mean, cur.overall.mean, true);
    error_rate_row(&base, &cur, &mut regressions);
    println!();

    if regressions.is_empty() {
        println!("  no regressions");
        Ok(0)
    } else {
        println!("  regressions: {}", regressions.join(", "));
        Ok(1)
    }
}

fn error_rate_row(base: &SummaryEvent, cur: &SummaryEvent, regressions: &mut Vec<String>) {
    let base_rate = base.error_rate();
    let cur_rate = cur.error_rate();
    println!(
        "  {:<14} {:>11.2}% {:>11.2}% {:>9}",
        "error rate",
        base_rate,
        cur_rate,
        if cur_rate > base_rate { "worse" } else { "ok" }
    );
    if cur_rate > base_rate {
        regressions.push(format!("error rate {base_rate:.2}% -> {cur_rate:.2}%"));
    }
}

fn relative_change(base: f64, cur: f64) -> f64 {
    if base == 0.0 {
        if cur == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        (cur - base) / base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_change_edges() {
        assert_eq!(relative_change(100.0, 110.0), 0.1);
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(0.0, 5.0), 1.0);
        assert_eq!(relative_change(200.0, 100.0), -0.5);
    }
}
