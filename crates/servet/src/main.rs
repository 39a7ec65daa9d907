//! Servet - session lifecycle and abuse-control server
//!
//! Main entry point for the Servet CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, hash, inspect, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Servet - session lifecycle and abuse-control server
#[derive(Parser)]
#[command(name = "servet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Servet server
    Start(start::StartArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Print the identity hash of a client address
    Hash(hash::HashArgs),

    /// Check a SQL string against the query denylist
    Inspect(inspect::InspectArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "servet=debug,servet_session=debug,servet_server=debug,servet_config=debug,tower_http=debug,info"
    } else {
        "servet=info,servet_session=info,servet_server=info,warn"
    };

    let log_dir = servet_config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "servet.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "servet=trace,servet_session=trace,servet_server=trace,servet_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Hash(args) => hash::run(args, &ctx),
        Commands::Inspect(args) => inspect::run(args, &ctx),
    }
}
