//! Start command - launches the Servet server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use servet_config::discovery::ConfigSource;
use servet_config::{self, LoadedConfig};
use servet_server::{AppState, Server, ServerConfig};
use servet_session::{ConnectionConfig, ManagerConfig, RateGuard, RateGuardConfig, SessionManager};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Session backend: memory, document-store or embedded-relational (overrides config)
    #[arg(long)]
    pub backend: Option<String>,

    /// Session lifetime in seconds (overrides config)
    #[arg(long)]
    pub ttl: Option<i64>,

    /// Allow at most one live session per client (overrides config)
    #[arg(long)]
    pub only_one: bool,

    /// Path to config file (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    // ── Load configuration ──────────────────────────────────────────────

    let loaded = if let Some(ref config_path) = args.config {
        let config = servet_config::load_config_file(config_path)?;
        LoadedConfig {
            config,
            sources: vec![ConfigSource {
                path: config_path.clone(),
                loaded: true,
            }],
            warnings: Vec::new(),
        }
    } else {
        servet_config::load_config(None)?
    };

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            println!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                println!("Loaded config: {}", source.display());
            }
        }
    }

    let config = &loaded.config;
    let server_section = config.server();
    let session_section = config.session();
    let rate_section = config.rate_limit();

    // ── Session engine ──────────────────────────────────────────────────

    let secret = session_section.resolve_secret()?;
    let manager_config = ManagerConfig {
        connection_type: args
            .backend
            .clone()
            .unwrap_or_else(|| session_section.connection_type.clone()),
        connection: ConnectionConfig {
            uri: session_section.connection.uri.clone(),
            database: session_section.connection.database.clone(),
            path: session_section.connection.path.clone(),
        },
        ..ManagerConfig::new(secret)
    }
    .with_ttl(args.ttl.unwrap_or(session_section.policy.ttl))
    .with_only_one(args.only_one || session_section.policy.only_one);

    let manager = SessionManager::new(manager_config)
        .await
        .context("Failed to open session store")?;

    if ctx.verbose {
        println!("Backend: {}", manager.kind());
        println!("Only one: {}", manager.policy().only_one);
    }

    // ── Rate guard ──────────────────────────────────────────────────────

    let decay_interval = rate_section
        .decay_interval
        .to_duration()
        .context("Invalid [rate_limit] decay_interval")?;
    let guard = RateGuard::new(RateGuardConfig::new(rate_section.threshold, decay_interval))?;

    // ── Server ──────────────────────────────────────────────────────────

    let bind = args.bind.unwrap_or(server_section.bind);
    let port = args.port.unwrap_or(server_section.port);
    let bind_address: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let server_config = ServerConfig::new()
        .with_bind_address(bind_address)
        .with_rate_limiting(rate_section.enabled)
        .with_deny_message(rate_section.deny_message)
        .with_request_logging(server_section.request_logging)
        .with_cors_origins(server_section.cors_origins);

    println!("Servet listening on http://{}", bind_address);
    tracing::info!(
        backend = %manager.kind(),
        rate_limiting = rate_section.enabled,
        "Starting Servet"
    );

    Server::new(AppState::new(manager, guard, server_config))
        .run()
        .await?;

    Ok(())
}
