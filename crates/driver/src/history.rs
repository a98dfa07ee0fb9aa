//! Named-run library under `$HOME/.mcp-stress/runs/`.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use stress_domain::error::{Error, Result};

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("run-name regex is valid"))
}

/// `$HOME/.mcp-stress/runs`, created on demand.
pub fn runs_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot locate home directory".into()))?;
    let dir = home.join(".mcp-stress").join("runs");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Validate a run name against `[A-Za-z0-9_-]+`.
pub fn validate_name(name: &str) -> Result<()> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid run name {name:?} (allowed: letters, digits, _ and -)"
        )))
    }
}

/// Path a named run lives at; does not check existence.
pub fn run_path(name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    Ok(runs_dir()?.join(format!("{name}.ndjson")))
}

/// Copy a run file into the library under `name`. A source already at
/// the library slot is left in place.
pub fn save(name: &str, source: &std::path::Path) -> Result<PathBuf> {
    let dest = run_path(name)?;
    if source != dest {
        std::fs::copy(source, &dest)?;
    }
    Ok(dest)
}

/// A library entry.
pub struct HistoryEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// List saved runs, sorted by name.
pub fn list() -> Result<Vec<HistoryEntry>> {
    let dir = runs_dir()?;
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("ndjson") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        entries.push(HistoryEntry {
            name: name.to_string(),
            size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            path,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Remove a saved run; missing targets are an error (exit 1 contract).
pub fn remove(name: &str) -> Result<()> {
    let path = run_path(name)?;
    if !path.exists() {
        return Err(Error::InvalidInput(format!("no saved run named {name:?}")));
    }
    std::fs::remove_file(&path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["baseline", "run-2", "A_b-3"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "has space", "dot.dot", "../escape", "slash/y"] {
            assert!(validate_name(name).is_err(), "{name:?} should be invalid");
        }
    }
}
