#![deny(unsafe_code)]

mod commands;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use symfs_core::SymfsConfig;

use crate::commands::{ls, statfs, watch};

/// Diagnostics for the SymFS passthrough file system
#[derive(Parser)]
#[command(name = "symfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Print invalidations for changes made under a directory
    symfs watch ~/shared

    # Same, as JSON lines with a larger change buffer
    symfs watch ~/shared --format json --buffer-size 65536

    # Show what the mount would report for a directory
    symfs ls ~/shared /docs
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file
    #[arg(short, long, env = "SYMFS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the change watcher on a directory and print notifications
    Watch(watch::Args),

    /// Show volume statistics as the mount reports them
    Statfs(statfs::Args),

    /// List a directory with the attributes the mount reports
    Ls(ls::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => SymfsConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SymfsConfig::default(),
    };

    match &cli.command {
        Commands::Watch(args) => watch::run(args, config),
        Commands::Statfs(args) => statfs::run(args, config),
        Commands::Ls(args) => ls::run(args, config),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
