pub mod aggregate;
pub mod chart;
pub mod compare;
pub mod diagnose;
pub mod discover;
pub mod history_cmd;
pub mod listings;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use stress_domain::error::{Error, Result};

use crate::engine::Target;

/// mcp-stress — a stress-testing driver for MCP servers.
#[derive(Debug, Parser)]
#[command(name = "mcp-stress", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a workload against an MCP server.
    Run(RunArgs),
    /// Render a recorded run to a self-contained HTML chart.
    Chart {
        /// NDJSON file of a recorded run.
        input: PathBuf,
        /// Output HTML path (defaults to the input with .html).
        output: Option<PathBuf>,
    },
    /// Diff two recorded runs and flag regressions.
    Compare {
        /// Baseline NDJSON run.
        baseline: PathBuf,
        /// Current NDJSON run.
        current: PathBuf,
    },
    /// Combine recorded runs into a cross-run aggregate.
    Aggregate {
        /// Two or more NDJSON run files.
        #[arg(required = true, num_args = 1..)]
        runs: Vec<PathBuf>,
        /// Write the aggregate NDJSON here.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Step-by-step connectivity probe against a server.
    Diagnose(TargetArgs),
    /// Enumerate a server's capabilities.
    Discover(TargetArgs),
    /// Named-run library under ~/.mcp-stress/runs.
    History {
        #[command(subcommand)]
        command: Option<HistoryCommand>,
    },
    /// List built-in workload profiles.
    Profiles,
    /// List built-in load shapes.
    Shapes,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List saved runs (the default).
    List,
    /// Remove a saved run.
    Rm {
        /// Saved run name.
        name: String,
    },
}

/// Where and how to reach the server; shared by run/diagnose/discover.
#[derive(Debug, Args, Clone)]
pub struct TargetArgs {
    /// HTTP(S) URL of the server (streamable HTTP unless --sse).
    #[arg(long)]
    pub url: Option<String>,

    /// Use the legacy SSE transport for --url.
    #[arg(long)]
    pub sse: bool,

    /// Extra HTTP header as "Name: value". Repeatable.
    #[arg(long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Extra child environment as KEY=VALUE (stdio only). Repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout: u64,

    /// Stdio server command line, after `--`.
    #[arg(last = true, value_name = "CMD ARGS...")]
    pub command: Vec<String>,
}

impl TargetArgs {
    /// Resolve into an engine target: exactly one of --url or `-- cmd`.
    pub fn resolve(&self) -> Result<Target> {
        match (&self.url, self.command.is_empty()) {
            (Some(_), false) => Err(Error::Config(
                "pass either --url or a stdio command after --, not both".into(),
            )),
            (None, true) => Err(Error::Config(
                "no target: pass --url URL or a stdio command after --".into(),
            )),
            (Some(url), true) => Ok(Target::Http {
                url: url.clone(),
                legacy_sse: self.sse,
                headers: parse_headers(&self.headers)?,
            }),
            (None, false) => Ok(Target::Stdio {
                command: self.command[0].clone(),
                args: self.command[1..].to_vec(),
                env: parse_env(&self.env)?,
            }),
        }
    }
}

fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|h| {
            h.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| Error::Config(format!("invalid header {h:?}, expected \"Name: value\"")))
        })
        .collect()
}

fn parse_env(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|e| {
            e.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| Error::Config(format!("invalid env {e:?}, expected KEY=VALUE")))
        })
        .collect()
}

/// Options for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Workload profile name (see `profiles`).
    #[arg(long, default_value = "baseline")]
    pub profile: String,

    /// Run duration in seconds (overrides the profile).
    #[arg(long)]
    pub duration: Option<u64>,

    /// Stop after this many requests (whichever of duration/requests
    /// hits first).
    #[arg(long)]
    pub requests: Option<u64>,

    /// Peak concurrency (overrides the profile).
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Pin tools/call operations to one tool.
    #[arg(long)]
    pub tool: Option<String>,

    /// Load shape name (see `shapes`).
    #[arg(long)]
    pub shape: Option<String>,

    /// NDJSON output path.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// PRNG seed for generated arguments (0 derives one from the clock).
    #[arg(long, default_value_t = 0)]
    pub seed: u32,

    /// Serve the live dashboard for this run.
    #[arg(long)]
    pub dashboard: bool,

    /// Print the summary object as JSON instead of tables.
    #[arg(long)]
    pub json: bool,

    /// Assertion like "p99 < 500ms". Repeatable; any failure exits 1.
    #[arg(long = "assert", value_name = "EXPR")]
    pub assertions: Vec<String>,

    /// Repeat the run N times and aggregate.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Save the run into the named-run library.
    #[arg(long)]
    pub save: Option<String>,

    /// Verbose logging.
    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn run_parses_stdio_command() {
        let cli = Cli::parse_from([
            "mcp-stress",
            "run",
            "--profile",
            "mixed",
            "--duration",
            "10",
            "--",
            "node",
            "server.js",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.profile, "mixed");
        let target = args.target.resolve().unwrap();
        match target {
            Target::Stdio { command, args, .. } => {
                assert_eq!(command, "node");
                assert_eq!(args, vec!["server.js"]);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn run_parses_url_with_headers() {
        let cli = Cli::parse_from([
            "mcp-stress",
            "run",
            "--url",
            "http://localhost:3000/mcp",
            "--header",
            "Authorization: Bearer abc",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        match args.target.resolve().unwrap() {
            Target::Http {
                url,
                legacy_sse,
                headers,
            } => {
                assert_eq!(url, "http://localhost:3000/mcp");
                assert!(!legacy_sse);
                assert_eq!(headers[0].0, "Authorization");
                assert_eq!(headers[0].1, "Bearer abc");
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn target_requires_exactly_one_kind() {
        let none = TargetArgs {
            url: None,
            sse: false,
            headers: vec![],
            env: vec![],
            timeout: 30_000,
            command: vec![],
        };
        assert!(none.resolve().is_err());

        let both = TargetArgs {
            url: Some("http://x".into()),
            command: vec!["server".into()],
            ..none.clone()
        };
        assert!(both.resolve().is_err());
    }

    #[test]
    fn sse_flag_selects_legacy_transport() {
        let args = TargetArgs {
            url: Some("http://localhost:9/sse".into()),
            sse: true,
            headers: vec![],
            env: vec![],
            timeout: 1_000,
            command: vec![],
        };
        match args.resolve().unwrap() {
            Target::Http { legacy_sse, .. } => assert!(legacy_sse),
            other => panic!("unexpected target {other:?}"),
        }
    }
}
