//! Command line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Duplex: two-region active-active storage and delivery failover control plane.
#[derive(Parser)]
#[command(name = "duplex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the control plane.
    Serve(ServeArgs),
    /// Validate a configuration file and exit.
    CheckConfig(CheckConfigArgs),
    /// Print version information.
    Version,
}

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Path to the TOML configuration file. Built-in defaults are used when
    /// omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the check-config command.
#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
}
