//! Device conformance CLI
//!
//! Exercises a networked device's v1 control API and verifies its state
//! machine, retrying through transient network failures.

use clap::Parser;
use conformance::common::{logging, paths};
use conformance::sequencer::Interrupt;
use conformance::{cli, commands::Commands};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conformance", about = "Conformance tests for networked lab devices")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Also write logs to the default log directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    log: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = cli.log_file.clone().or_else(|| {
        if !cli.log {
            return None;
        }
        match paths::ensure_log_dir() {
            Ok(dir) => dir.map(|d| d.join("conformance.log")),
            Err(e) => {
                eprintln!("Warning: Could not create log directory: {}", e);
                None
            }
        }
    });
    let guard = logging::init(cli.verbose, log_file.as_deref());

    let (trigger, interrupt) = Interrupt::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.fire();
        }
    });

    let code = match cli::dispatch(cli.command, interrupt).await {
        Ok(Some(report)) if report.succeeded() => 0,
        Ok(Some(_)) => 1,
        Ok(None) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}
