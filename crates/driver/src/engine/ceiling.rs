//! Find-ceiling controller: step concurrency upward in phases until
//! throughput plateaus, degrades, or errors saturate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use stress_domain::events::{CeilingReport, PhaseReport};
use stress_domain::workload::{FindCeilingConfig, WorkloadProfile};
use stress_mcp_client::McpClient;

use crate::recorder::Recorder;

use super::ops::Dispatcher;

/// Relative p50 increase that, combined with a flat rps, reads as a
/// plateau.
const P50_GAIN_LIMIT: f64 = 0.2;

/// Next rung of the concurrency ladder: +1 up to 5, +5 up to 20, then
/// +10.
fn next_concurrency(current: u32) -> u32 {
    if current < 5 {
        current + 1
    } else if current < 20 {
        current + 5
    } else {
        current + 10
    }
}

/// Run the phased controller. Returns the recorded phases and the
/// terminal verdict.
pub async fn run(
    profile: &WorkloadProfile,
    config: &FindCeilingConfig,
    client: &Arc<McpClient>,
    dispatcher: &Arc<Dispatcher>,
    recorder: &Arc<Recorder>,
) -> (Vec<PhaseReport>, Option<CeilingReport>) {
    let phase_secs = config
        .phase_duration_secs
        .min(profile.duration_secs / 5)
        .max(5);
    let phase_duration = Duration::from_secs(phase_secs);

    let mut phases: Vec<PhaseReport> = Vec::new();
    let mut concurrency = 1u32;
    let mut phase_idx = 0u32;

    loop {
        if concurrency > config.max_concurrency {
            tracing::info!(
                max_concurrency = config.max_concurrency,
                "no plateau detected within the concurrency ladder"
            );
            return (
                phases,
                Some(CeilingReport {
                    concurrency: config.max_concurrency,
                    reason: "no-plateau".into(),
                }),
            );
        }

        tracing::info!(phase = phase_idx, concurrency, "starting phase");
        recorder.set_phase(phase_idx as i32);
        recorder.publish_concurrency(concurrency);

        let start_total = recorder.total();
        let start_errors = recorder.errors();
        let start_idx = recorder.latency_count();
        let phase_start = Instant::now();
        let deadline = phase_start + phase_duration;

        // Tight-loop workers for the phase duration.
        let workers = (0..concurrency).map(|_| {
            let client = Arc::clone(client);
            let dispatcher = Arc::clone(dispatcher);
            let recorder = Arc::clone(recorder);
            async move {
                while Instant::now() < deadline {
                    dispatcher.run_one(&client, &recorder).await;
                }
            }
        });
        join_all(workers).await;

        let phase_elapsed = phase_start.elapsed().as_secs_f64();
        let phase_total = recorder.total() - start_total;
        let phase_errors = recorder.errors() - start_errors;
        let rps = if phase_elapsed > 0.0 {
            phase_total as f64 / phase_elapsed
        } else {
            0.0
        };
        let mut window = recorder.latencies_since(start_idx);
        window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p50 = stress_stats::percentile(&window, 0.50);
        let p99 = stress_stats::percentile(&window, 0.99);

        let report = PhaseReport {
            phase: phase_idx,
            concurrency,
            total: phase_total,
            errors: phase_errors,
            rps,
            p50,
            p99,
        };
        tracing::info!(
            phase = phase_idx,
            concurrency,
            rps = format!("{rps:.1}"),
            p50 = format!("{p50:.2}"),
            p99 = format!("{p99:.2}"),
            errors = phase_errors,
            "phase complete"
        );

        // Evaluate the plateau rules in order; the first match ends the
        // run.
        if let Some(prev) = phases.last() {
            let rps_gain = if prev.rps > 0.0 {
                (rps - prev.rps) / prev.rps
            } else {
                0.0
            };
            let p50_gain = if prev.p50 > 0.0 {
                (p50 - prev.p50) / prev.p50
            } else {
                0.0
            };

            if rps_gain < config.plateau_threshold && p50_gain > P50_GAIN_LIMIT {
                let ceiling = prev.concurrency;
                phases.push(report);
                tracing::info!(concurrency = ceiling, "throughput plateau detected");
                return (
                    phases,
                    Some(CeilingReport {
                        concurrency: ceiling,
                        reason: "plateau".into(),
                    }),
                );
            }
            if rps < 0.9 * prev.rps {
                phases.push(report);
                tracing::info!(concurrency, "throughput degradation detected");
                return (
                    phases,
                    Some(CeilingReport {
                        concurrency,
                        reason: "degradation".into(),
                    }),
                );
            }
        }
        if phase_errors as f64 > 0.1 * phase_total as f64 && phase_total > 0 {
            phases.push(report);
            tracing::info!(concurrency, "error saturation detected");
            return (
                phases,
                Some(CeilingReport {
                    concurrency,
                    reason: "error-saturation".into(),
                }),
            );
        }

        phases.push(report);
        concurrency = next_concurrency(concurrency);
        phase_idx += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_steps() {
        let mut ladder = vec![1u32];
        while *ladder.last().unwrap() < 60 {
            ladder.push(next_concurrency(*ladder.last().unwrap()));
        }
        assert_eq!(ladder, vec![1, 2, 3, 4, 5, 10, 15, 20, 30, 40, 50, 60]);
    }
}
