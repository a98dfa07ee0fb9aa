//! The `chart` subcommand: NDJSON in, self-contained HTML out.

use std::path::{Path, PathBuf};

use stress_domain::error::{Error, Result};
use stress_stats::build_chart;

use crate::ndjson;
use crate::report;

/// Render a recorded run; exit 1 on empty input.
pub fn run(input: &Path, output: Option<&Path>) -> Result<i32> {
    let run = ndjson::read_file(input)?;
    if run.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{}: no request events to chart",
            input.display()
        )));
    }

    let duration_ms = run
        .summary
        .as_ref()
        .map(|s| s.duration_ms)
        .or_else(|| run.events.last().map(|e| e.t))
        .unwrap_or(0);
    let chart = build_chart(&run.events, duration_ms);

    let html = report::render_chart_html(run.meta.as_ref(), &chart, run.summary.as_ref());
    let out_path: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("html"),
    };
    std::fs::write(&out_path, html)?;
    println!("chart written to {}", out_path.display());
    Ok(0)
}
