//! CLI command definitions
//!
//! Defines the clap commands for the conformance CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::families::DeviceFamily;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the built-in conformance suite against a device
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip family-specific scenarios; run only the shared base suite
        #[arg(long)]
        basic_only: bool,
    },

    /// Run a hand-authored YAML scenario script
    Script {
        /// Path to the script file
        path: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show the configuration and log locations in effect
    Paths,
}

/// Device selection and run options shared by every command that talks to a device
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Device address: host, host:port or http:// URL (default: 192.168.4.1, AP mode)
    #[arg(long, short = 'a', visible_alias = "ip")]
    pub address: Option<String>,

    /// Device family to exercise
    #[arg(long, short = 'f', value_enum)]
    pub family: Option<DeviceFamily>,

    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Re-query state until it converges instead of waiting fixed delays
    #[arg(long)]
    pub poll: bool,
}
