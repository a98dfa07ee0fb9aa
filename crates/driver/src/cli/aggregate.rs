//! The `aggregate` subcommand and the aggregate NDJSON writer shared
//! with `run --repeat`.

use std::io::Write;
use std::path::{Path, PathBuf};

use stress_domain::error::{Error, Result};
use stress_domain::events::{AggregateSummary, SummaryEvent};
use stress_stats::aggregate_summaries;

use crate::ndjson;
use crate::report;

/// Combine recorded runs; exit 1 on invalid inputs.
pub fn run(runs: &[PathBuf], out: Option<&Path>) -> Result<i32> {
    if runs.len() < 2 {
        return Err(Error::InvalidInput(
            "aggregate needs at least two run files".into(),
        ));
    }

    let mut summaries = Vec::with_capacity(runs.len());
    let mut first_meta = None;
    for path in runs {
        let (meta, summary) = ndjson::read_completed(path)?;
        if first_meta.is_none() {
            first_meta = Some(meta);
        }
        summaries.push(summary);
    }

    let aggregate = aggregate_summaries(&summaries);
    report::print_aggregate(&aggregate);

    if let Some(path) = out {
        let meta = first_meta.expect("at least two runs were read");
        let mean = super::run::mean_summary(&aggregate);
        write_aggregate_file(path, &meta.profile, &meta.command, meta.seed, &aggregate, &mean)?;
        println!("aggregate written to {}", path.display());
    }
    Ok(0)
}

/// Write an aggregate NDJSON file: a meta line flagged with
/// `aggregate: true` and `runCount`, then a summary line carrying the
/// cross-run means (counts rounded to integers) plus the per-metric
/// spread.
pub fn write_aggregate_file(
    path: &Path,
    profile: &str,
    command: &str,
    seed: u32,
    aggregate: &AggregateSummary,
    mean: &SummaryEvent,
) -> Result<()> {
    let meta = serde_json::json!({
        "type": "meta",
        "runId": uuid::Uuid::new_v4().to_string(),
        "startedAt": chrono::Utc::now().to_rfc3339(),
        "profile": profile,
        "command": command,
        "seed": seed,
        "aggregate": true,
        "runCount": aggregate.run_count,
    });

    let mut summary_value = serde_json::to_value(mean)?;
    if let Some(obj) = summary_value.as_object_mut() {
        obj.insert("type".into(), "summary".into());
        obj.insert("aggregate".into(), serde_json::to_value(aggregate)?);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{meta}")?;
    writeln!(file, "{summary_value}")?;
    file.flush()?;
    Ok(())
}
