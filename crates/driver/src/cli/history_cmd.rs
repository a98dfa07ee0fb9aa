//! The `history` subcommand: list and remove saved runs.

use stress_domain::error::Result;

use crate::history;
use crate::ndjson;

use super::HistoryCommand;

pub fn run(command: Option<HistoryCommand>) -> Result<i32> {
    match command.unwrap_or(HistoryCommand::List) {
        HistoryCommand::List => list(),
        HistoryCommand::Rm { name } => {
            history::remove(&name)?;
            println!("removed {name}");
            Ok(0)
        }
    }
}

fn list() -> Result<i32> {
    let entries = history::list()?;
    if entries.is_empty() {
        println!("no saved runs (save one with `run --save NAME`)");
        return Ok(0);
    }
    for entry in entries {
        // A readable one-liner per run; unreadable files still list.
        match ndjson::read_completed(&entry.path) {
            Ok((meta, summary)) => println!(
                "  {:<24} {:<12} {:>8} req {:>7.1} req/s  p99 {:>8.2}ms  {}",
                entry.name,
                meta.profile,
                summary.total_requests,
                summary.requests_per_second,
                summary.overall.p99,
                meta.started_at
            ),
            Err(_) => println!(
                "  {:<24} ({} bytes, unreadable or incomplete)",
                entry.name, entry.size_bytes
            ),
        }
    }
    Ok(0)
}
