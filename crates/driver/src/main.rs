use clap::Parser;
use tracing_subscriber::EnvFilter;

use stress_driver::cli::{self, Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Command::Run(args) if args.verbose);
    init_tracing(verbose);

    let result = dispatch(cli.command).await;
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn dispatch(command: Command) -> stress_domain::error::Result<i32> {
    match command {
        Command::Run(args) => cli::run::run(args).await,
        Command::Chart { input, output } => cli::chart::run(&input, output.as_deref()),
        Command::Compare { baseline, current } => cli::compare::run(&baseline, &current),
        Command::Aggregate { runs, out } => cli::aggregate::run(&runs, out.as_deref()),
        Command::Diagnose(args) => cli::diagnose::run(args).await,
        Command::Discover(args) => cli::discover::run(args).await,
        Command::History { command } => cli::history_cmd::run(command),
        Command::Profiles => {
            cli::listings::profiles();
            Ok(0)
        }
        Command::Shapes => {
            cli::listings::shapes();
            Ok(0)
        }
    }
}

/// Console-friendly tracing: quiet by default, debug with --verbose,
/// always overridable through RUST_LOG.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "mcp_stress=debug,stress_driver=debug,stress_mcp_client=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
