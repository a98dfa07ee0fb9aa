//! Percentile computation by linear interpolation on a pre-sorted vector.

use stress_domain::events::LatencyStats;

/// Percentile `q` in [0, 1] of a sorted slice.
///
/// Empty input yields 0; a single element yields that element. Between
/// ranks the value is linearly interpolated:
/// `sorted[i] + (sorted[i+1] - sorted[i]) * frac` with
/// `idx = q * (n - 1)`, `i = floor(idx)`, `frac = idx - i`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let idx = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let i = idx.floor() as usize;
            let frac = idx - i as f64;
            if i + 1 >= n {
                sorted[n - 1]
            } else {
                sorted[i] + (sorted[i + 1] - sorted[i]) * frac
            }
        }
    }
}

/// Full latency distribution of an unsorted slice.
///
/// Sorts a copy; callers on the hot path should batch calls.
pub fn latency_stats(values: &[f64]) -> LatencyStats {
    if values.is_empty() {
        return LatencyStats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let sum: f64 = sorted.iter().sum();
    LatencyStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: sum / sorted.len() as f64,
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn single_element_is_itself() {
        assert_eq!(percentile(&[42.0], 0.99), 42.0);
        assert_eq!(percentile(&[42.0], 0.0), 42.0);
    }

    #[test]
    fn interpolates_between_ranks() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
    }

    #[test]
    fn extremes_hit_min_and_max() {
        let xs = [1.0, 5.0, 9.0];
        assert_eq!(percentile(&xs, 0.0), 1.0);
        assert_eq!(percentile(&xs, 1.0), 9.0);
    }

    #[test]
    fn monotonic_in_q() {
        let xs: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let mut last = f64::MIN;
        for i in 0..=100 {
            let q = i as f64 / 100.0;
            let p = percentile(&xs, q);
            assert!(p >= last, "percentile not monotonic at q={q}");
            last = p;
        }
    }

    #[test]
    fn stats_over_one_to_hundred() {
        let xs: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let stats = latency_stats(&xs);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.mean, 50.5);
        assert_eq!(stats.p50, 50.5);
        assert!(stats.p99 > 99.0 && stats.p99 <= 100.0);
    }

    #[test]
    fn stats_of_empty_are_default() {
        let stats = latency_stats(&[]);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.p99, 0.0);
    }
}
