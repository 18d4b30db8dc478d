//! CLI argument definitions for ironsight-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Ironsight attack-surface enumeration daemon.
///
/// Runs the full discovery pipeline: passive data sources, DNS
/// validation, graph construction, and output emission for the
/// configured root domains.
#[derive(Parser, Debug)]
#[command(name = "ironsight-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ironsight.toml configuration file.
    #[arg(short, long, default_value = "/etc/ironsight/ironsight.toml")]
    pub config: PathBuf,

    /// Root domain to enumerate (repeatable; replaces the config list).
    #[arg(short = 'd', long = "domain")]
    pub domains: Vec<String>,

    /// Override the output file path (takes precedence over config).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the enumeration.
    #[arg(long)]
    pub validate: bool,
}
