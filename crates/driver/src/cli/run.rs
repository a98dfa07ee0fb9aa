//! The `run` subcommand: resolve the plan, execute one or more runs,
//! report, assert, save.

use std::path::PathBuf;

use stress_domain::error::{Error, Result};
use stress_domain::events::SummaryEvent;
use stress_domain::shapes::LoadShape;
use stress_domain::workload::{self, OpKind, OperationMix, WorkloadProfile};
use stress_stats::{aggregate_summaries, build_chart, Assertion};

use crate::dashboard::DashboardServer;
use crate::engine::{self, RunPlan};
use crate::{history, report};

use super::{aggregate::write_aggregate_file, RunArgs};

/// Execute the run subcommand; returns the process exit code.
pub async fn run(args: RunArgs) -> Result<i32> {
    let profile = resolve_profile(&args)?;
    let target = args.target.resolve()?;

    let assertions = args
        .assertions
        .iter()
        .map(|raw| Assertion::parse(raw).map_err(|e| Error::Assertion(e.to_string())))
        .collect::<Result<Vec<_>>>()?;

    if let Some(name) = &args.save {
        history::validate_name(name)?;
    }

    // Resolve the seed up front so the meta event reproduces the run.
    let seed = if args.seed == 0 {
        let mut rng = crate::rng::Mulberry32::new(0);
        (rng.next_f01() * u32::MAX as f64) as u32 | 1
    } else {
        args.seed
    };

    let repeat = args.repeat.max(1);
    let out_paths = resolve_out_paths(&args, repeat)?;
    let command = reproduction_command(&args, &profile, seed);

    let dashboard = if args.dashboard {
        match DashboardServer::start().await {
            Ok(server) => {
                println!("dashboard: http://{}/", server.addr);
                Some(server)
            }
            Err(e) => {
                tracing::warn!(error = %e, "dashboard failed to start, continuing without");
                None
            }
        }
    } else {
        None
    };
    let dash_handle = dashboard.as_ref().map(|d| d.handle());

    let mut summaries: Vec<SummaryEvent> = Vec::new();
    for index in 0..repeat {
        let plan = RunPlan {
            profile: profile.clone(),
            target: target.clone(),
            timeout_ms: args.target.timeout,
            out_path: out_paths.per_run.get(index as usize).cloned().flatten(),
            seed,
            command: command.clone(),
        };

        if repeat > 1 {
            if let Some(dash) = &dash_handle {
                dash.emit(
                    "new-run",
                    serde_json::json!({ "index": index, "total": repeat }),
                );
            }
            println!("run {}/{repeat}", index + 1);
        }

        let outcome = engine::execute(&plan, dash_handle.as_ref()).await?;
        let chart = build_chart(
            &outcome.artifacts.events,
            outcome.artifacts.summary.duration_ms,
        );

        if let Some(dash) = &dash_handle {
            if repeat > 1 {
                dash.emit(
                    "run-complete",
                    serde_json::json!({ "index": index, "prepared": chart }),
                );
            } else {
                dash.emit("complete", serde_json::to_value(&chart).unwrap_or_default());
            }
        }
        summaries.push(outcome.artifacts.summary);
    }

    // Reporting and assertions run against the single summary, or the
    // cross-run mean summary for repeated runs.
    let (effective, aggregate) = if repeat > 1 {
        let aggregate = aggregate_summaries(&summaries);
        let mean = mean_summary(&aggregate);
        if let Some(path) = &out_paths.aggregate {
            write_aggregate_file(path, &profile.name, &command, seed, &aggregate, &mean)?;
            println!("aggregate written to {}", path.display());
        }
        if let Some(dash) = &dash_handle {
            dash.emit(
                "all-complete",
                serde_json::json!({ "summary": aggregate }),
            );
        }
        (mean, Some(aggregate))
    } else {
        (summaries.remove(0), None)
    };

    if args.json {
        match &aggregate {
            Some(agg) => println!("{}", serde_json::to_string_pretty(agg)?),
            None => println!("{}", serde_json::to_string_pretty(&effective)?),
        }
    } else {
        match &aggregate {
            Some(agg) => report::print_aggregate(agg),
            None => report::print_summary(&effective),
        }
    }

    let results: Vec<_> = assertions.iter().map(|a| a.evaluate(&effective)).collect();
    if !results.is_empty() && !args.json {
        report::print_assertions(&results);
    }
    let failed = results.iter().any(|r| !r.passed);

    if let Some(name) = &args.save {
        let source = out_paths
            .aggregate
            .as_ref()
            .or(out_paths.per_run.first().and_then(|p| p.as_ref()))
            .cloned()
            .ok_or_else(|| Error::Other("no output file to save".into()))?;
        let dest = history::save(name, &source)?;
        println!("saved as {} ({})", name, dest.display());
    }

    if let Some(server) = dashboard {
        server.shutdown();
    }

    Ok(if failed { 1 } else { 0 })
}

/// Profile lookup plus CLI overrides.
fn resolve_profile(args: &RunArgs) -> Result<WorkloadProfile> {
    let mut profile = workload::find_profile(&args.profile).ok_or_else(|| {
        let names: Vec<String> = workload::builtin_profiles()
            .into_iter()
            .map(|p| p.name)
            .collect();
        Error::Config(format!(
            "unknown profile {:?} (available: {})",
            args.profile,
            names.join(", ")
        ))
    })?;

    if let Some(duration) = args.duration {
        profile.duration_secs = duration;
    }
    profile.requests = args.requests.or(profile.requests);
    if let Some(concurrency) = args.concurrency {
        profile.concurrency = concurrency;
    }
    if let Some(shape) = &args.shape {
        profile.shape = LoadShape::parse(shape)
            .ok_or_else(|| Error::Config(format!("unknown shape {shape:?} (see `shapes`)")))?;
    }
    if let Some(tool) = &args.tool {
        let mut pinned = false;
        for mix in &mut profile.operations {
            if mix.op == OpKind::ToolsCall {
                mix.tool = Some(tool.clone());
                pinned = true;
            }
        }
        if !pinned {
            // A pinned tool on a profile without tools/call means the
            // user wants a tool workload; give them one.
            profile.operations = vec![OperationMix {
                op: OpKind::ToolsCall,
                tool: Some(tool.clone()),
                weight: 1,
            }];
        }
    }
    Ok(profile)
}

struct OutPaths {
    /// One entry per run (None = no file).
    per_run: Vec<Option<PathBuf>>,
    /// The aggregate file for repeated runs.
    aggregate: Option<PathBuf>,
}

/// Work out where each run lands on disk. A repeated run with
/// `--out runs.ndjson` writes `runs.run1.ndjson` .. `runs.runN.ndjson`
/// plus the aggregate at `runs.ndjson`; `--save` without `--out`
/// writes straight into the library slot.
fn resolve_out_paths(args: &RunArgs, repeat: u32) -> Result<OutPaths> {
    let base: Option<PathBuf> = match (&args.out, &args.save) {
        (Some(out), _) => Some(out.clone()),
        (None, Some(name)) => Some(history::run_path(name)?),
        (None, None) => None,
    };

    if repeat == 1 {
        return Ok(OutPaths {
            per_run: vec![base],
            aggregate: None,
        });
    }

    match base {
        Some(base) => {
            let stem = base
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("run")
                .to_string();
            let parent = base.parent().map(PathBuf::from).unwrap_or_default();
            let per_run = (1..=repeat)
                .map(|i| Some(parent.join(format!("{stem}.run{i}.ndjson"))))
                .collect();
            Ok(OutPaths {
                per_run,
                aggregate: Some(base),
            })
        }
        None => Ok(OutPaths {
            per_run: vec![None; repeat as usize],
            aggregate: None,
        }),
    }
}

/// Rebuild the command line that reproduces this run, with the seed
/// resolved.
fn reproduction_command(args: &RunArgs, profile: &WorkloadProfile, seed: u32) -> String {
    let mut parts = vec![
        "mcp-stress".to_string(),
        "run".to_string(),
        format!("--profile {}", profile.name),
        format!("--duration {}", profile.duration_secs),
        format!("--concurrency {}", profile.concurrency),
        format!("--shape {}", profile.shape),
        format!("--seed {seed}"),
    ];
    if let Some(requests) = profile.requests {
        parts.push(format!("--requests {requests}"));
    }
    if let Some(tool) = &args.tool {
        parts.push(format!("--tool {tool}"));
    }
    if args.repeat > 1 {
        parts.push(format!("--repeat {}", args.repeat));
    }
    match &args.target.url {
        Some(url) => {
            parts.push(format!("--url {url}"));
            if args.target.sse {
                parts.push("--sse".into());
            }
        }
        None => {
            parts.push("--".into());
            parts.extend(args.target.command.iter().cloned());
        }
    }
    parts.join(" ")
}

/// A summary-shaped view of the cross-run means; counts are rounded to
/// integers.
pub fn mean_summary(aggregate: &stress_domain::events::AggregateSummary) -> SummaryEvent {
    use stress_domain::events::LatencyStats;
    let mut summary = SummaryEvent::empty();
    summary.total_requests = aggregate.total_requests.mean.round() as u64;
    summary.total_errors = aggregate.total_errors.mean.round() as u64;
    summary.duration_ms = aggregate.duration_ms.mean.round() as u64;
    summary.requests_per_second = aggregate.requests_per_second.mean;
    summary.overall = LatencyStats {
        min: aggregate.overall.min.mean,
        max: aggregate.overall.max.mean,
        mean: aggregate.overall.mean.mean,
        p50: aggregate.overall.p50.mean,
        p95: aggregate.overall.p95.mean,
        p99: aggregate.overall.p99.mean,
    };
    summary
}
