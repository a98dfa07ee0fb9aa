//! Run orchestration: resolve a plan, open a session, drive the
//! workload under the chosen controller, and collect the artifacts.

pub mod ceiling;
pub mod churn;
pub mod ops;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use stress_domain::error::{Error, Result};
use stress_domain::events::MetaEvent;
use stress_domain::workload::WorkloadProfile;
use stress_mcp_client::{
    McpClient, McpTransport, SseConfig, SseTransport, StdioConfig, StdioTransport,
    StreamableConfig, StreamableTransport, TransportKind,
};

use crate::aggregator::{AggregatorHandle, RunArtifacts};
use crate::dashboard::DashboardHandle;
use crate::recorder::Recorder;

/// What the driver connects to.
#[derive(Debug, Clone)]
pub enum Target {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
        legacy_sse: bool,
        headers: Vec<(String, String)>,
    },
}

impl Target {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Http {
                legacy_sse: true, ..
            } => TransportKind::Sse,
            Self::Http { .. } => TransportKind::StreamableHttp,
        }
    }

    /// Human-readable target for the meta event.
    pub fn describe(&self) -> String {
        match self {
            Self::Stdio { command, args, .. } => {
                let mut parts = vec![command.clone()];
                parts.extend(args.iter().cloned());
                parts.join(" ")
            }
            Self::Http { url, .. } => url.clone(),
        }
    }

    /// Build a fresh, unconnected transport.
    pub fn build_transport(&self, timeout: Duration) -> Arc<dyn McpTransport> {
        match self {
            Self::Stdio { command, args, env } => Arc::new(StdioTransport::new(StdioConfig {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
                timeout,
            })),
            Self::Http {
                url,
                legacy_sse: true,
                headers,
            } => Arc::new(SseTransport::new(SseConfig {
                url: url.clone(),
                headers: headers.clone(),
                timeout,
            })),
            Self::Http { url, headers, .. } => {
                Arc::new(StreamableTransport::new(StreamableConfig {
                    url: url.clone(),
                    headers: headers.clone(),
                    timeout,
                }))
            }
        }
    }
}

/// A fully resolved run: profile with overrides applied, target,
/// timing, output and reproduction command.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub profile: WorkloadProfile,
    pub target: Target,
    pub timeout_ms: u64,
    pub out_path: Option<PathBuf>,
    /// Non-zero; a clock-derived seed is resolved before planning so
    /// the meta event can reproduce the run.
    pub seed: u32,
    /// Command line that reproduces this run.
    pub command: String,
}

impl RunPlan {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn meta(&self, run_id: String) -> MetaEvent {
        MetaEvent {
            run_id,
            started_at: chrono::Utc::now().to_rfc3339(),
            transport: self.target.kind().as_str().to_string(),
            target: self.target.describe(),
            profile: self.profile.name.clone(),
            shape: self.profile.shape.as_str().to_string(),
            duration_secs: self.profile.duration_secs,
            requests: self.profile.requests,
            concurrency: self.profile.concurrency,
            timeout_ms: self.timeout_ms,
            seed: self.seed,
            command: self.command.clone(),
            aggregate: None,
            run_count: None,
        }
    }
}

/// A completed run.
pub struct RunOutcome {
    pub meta: MetaEvent,
    pub artifacts: RunArtifacts,
}

/// Execute one run end to end.
///
/// Per-request failures never terminate the run; a handshake failure
/// aborts it after flushing the partial NDJSON (meta only, no summary).
pub async fn execute(plan: &RunPlan, dashboard: Option<&DashboardHandle>) -> Result<RunOutcome> {
    let meta = plan.meta(uuid::Uuid::new_v4().to_string());
    let aggregator = AggregatorHandle::spawn(meta.clone(), plan.out_path.clone())?;
    let recorder = Recorder::new(aggregator.inbox());
    let flusher = recorder.spawn_flusher();

    if let Some(dash) = dashboard {
        dash.emit("meta", serde_json::to_value(&meta).unwrap_or_default());
    }

    let transport = plan.target.build_transport(plan.timeout());
    let client = Arc::new(McpClient::new(Arc::clone(&transport)));

    // Handshake; fatal on failure.
    let handshake = async {
        transport
            .connect()
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        client
            .initialize()
            .await
            .map_err(|f| Error::Handshake(f.to_string()))?;
        Ok::<(), Error>(())
    }
    .await;

    if let Err(e) = handshake {
        tracing::error!(error = %e, "MCP handshake failed");
        flusher.abort();
        recorder.flush();
        aggregator.abandon().await;
        transport.close().await;
        return Err(e);
    }

    if let Some(info) = client.server_info() {
        tracing::info!(server = %info.name, version = %info.version, "session established");
        if let Some(dash) = dashboard {
            dash.message(&format!("connected to {} {}", info.name, info.version));
        }
    }

    let ticker = dashboard.map(|dash| spawn_window_ticker(Arc::clone(&recorder), dash.clone()));

    // Drive the workload under the configured controller.
    let (phases, ceiling) = if plan.profile.connection_churn {
        churn::run(plan, &recorder).await;
        (Vec::new(), None)
    } else {
        let dispatcher = Arc::new(
            ops::Dispatcher::build(&client, &plan.profile, &recorder, plan.seed).await,
        );
        match &plan.profile.find_ceiling {
            Some(config) => {
                ceiling::run(
                    &plan.profile,
                    config,
                    &client,
                    &dispatcher,
                    &recorder,
                )
                .await
            }
            None => {
                run_shaped(&plan.profile, &client, &dispatcher, &recorder).await;
                (Vec::new(), None)
            }
        }
    };

    if let Some(t) = ticker {
        t.abort();
    }
    flusher.abort();
    recorder.flush();
    let artifacts = aggregator.complete(phases, ceiling).await?;
    client.close().await;

    Ok(RunOutcome { meta, artifacts })
}

/// Shaped execution: one batch of `target` parallel operations per
/// tick, waiting for the whole batch before the next.
async fn run_shaped(
    profile: &WorkloadProfile,
    client: &Arc<McpClient>,
    dispatcher: &Arc<ops::Dispatcher>,
    recorder: &Arc<Recorder>,
) {
    let duration = profile.duration_secs as f64;
    let peak = profile.concurrency;
    let start = Instant::now();

    loop {
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed >= duration {
            break;
        }
        if let Some(cap) = profile.requests {
            if recorder.total() >= cap {
                break;
            }
        }

        let mut target = profile.shape.target(elapsed, duration, peak);
        if let Some(cap) = profile.requests {
            let remaining = cap.saturating_sub(recorder.total());
            target = target.min(remaining.min(u32::MAX as u64) as u32);
            if target == 0 {
                break;
            }
        }
        recorder.publish_concurrency(target);

        let batch = (0..target).map(|_| {
            let client = Arc::clone(client);
            let dispatcher = Arc::clone(dispatcher);
            let recorder = Arc::clone(recorder);
            async move {
                dispatcher.run_one(&client, &recorder).await;
            }
        });
        join_all(batch).await;
    }
}

/// One-second dashboard windows: counts and percentiles over the
/// records since the previous tick.
fn spawn_window_ticker(
    recorder: Arc<Recorder>,
    dashboard: DashboardHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_total = 0u64;
        let mut last_errors = 0u64;
        let mut last_idx = 0usize;
        loop {
            interval.tick().await;
            let total = recorder.total();
            let errors = recorder.errors();
            let mut window = recorder.latencies_since(last_idx);
            last_idx += window.len();
            window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let payload = serde_json::json!({
                "t": recorder.elapsed_ms(),
                "count": total - last_total,
                "errors": errors - last_errors,
                "p50": stress_stats::percentile(&window, 0.50),
                "p95": stress_stats::percentile(&window, 0.95),
                "p99": stress_stats::percentile(&window, 0.99),
                "concurrency": recorder.concurrency(),
            });
            last_total = total;
            last_errors = errors;
            dashboard.emit("window", payload);
        }
    })
}
