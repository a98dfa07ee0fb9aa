//! NDJSON file reader: parse a recorded run back into its events.
//!
//! The format invariants are checked leniently on read: a missing meta
//! or summary is represented as `None` so consumers can decide what is
//! fatal for them.

use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;

use stress_domain::error::{Error, Result};
use stress_domain::events::{MetaEvent, RequestEvent, SummaryEvent};

/// One parsed run file.
#[derive(Debug, Default)]
pub struct RunFile {
    pub meta: Option<MetaEvent>,
    pub events: Vec<RequestEvent>,
    /// Present only when the run completed.
    pub summary: Option<SummaryEvent>,
}

impl RunFile {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Read and parse a run file. Unknown `type` tags and malformed lines
/// are reported as errors; the format has no room for junk.
pub fn read_file(path: &Path) -> Result<RunFile> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
    let reader = BufReader::new(file);

    let mut out = RunFile::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|e| {
            Error::InvalidInput(format!("{}:{}: {e}", path.display(), line_no + 1))
        })?;

        match value.get("type").and_then(Value::as_str) {
            Some("meta") => {
                let meta: MetaEvent = serde_json::from_value(value).map_err(|e| {
                    Error::InvalidInput(format!("{}:{}: meta: {e}", path.display(), line_no + 1))
                })?;
                out.meta = Some(meta);
            }
            Some("summary") => {
                let summary: SummaryEvent = serde_json::from_value(value).map_err(|e| {
                    Error::InvalidInput(format!(
                        "{}:{}: summary: {e}",
                        path.display(),
                        line_no + 1
                    ))
                })?;
                out.summary = Some(summary);
            }
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "{}:{}: unknown event type {other:?}",
                    path.display(),
                    line_no + 1
                )));
            }
            None => {
                let event: RequestEvent = serde_json::from_value(value).map_err(|e| {
                    Error::InvalidInput(format!("{}:{}: {e}", path.display(), line_no + 1))
                })?;
                out.events.push(event);
            }
        }
    }
    Ok(out)
}

/// Read a file that must carry a completed summary (compare, aggregate).
pub fn read_completed(path: &Path) -> Result<(MetaEvent, SummaryEvent)> {
    let run = read_file(path)?;
    let meta = run
        .meta
        .ok_or_else(|| Error::InvalidInput(format!("{}: missing meta line", path.display())))?;
    let summary = run.summary.ok_or_else(|| {
        Error::InvalidInput(format!(
            "{}: missing summary line (incomplete run)",
            path.display()
        ))
    })?;
    Ok((meta, summary))
}
