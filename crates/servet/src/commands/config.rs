//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use servet_config::{self, PROJECT_CONFIG_FILE, ServetConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./servet.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = servet_config::load_config(None)?;
    let config = &loaded.config;
    let sources = loaded.loaded_from();

    if ctx.json_output {
        let mut session = config.session();
        // Never echo the secret itself.
        session.secret = session.secret.map(|_| "<redacted>".to_string());
        let output = serde_json::json!({
            "sources": sources.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "warnings": loaded.warnings,
            "server": config.server(),
            "session": session,
            "rate_limit": config.rate_limit(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# Servet Configuration\n");

    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    for warning in &loaded.warnings {
        println!("warning: {}", warning);
    }

    let server = config.server();
    println!("Server:");
    println!("  bind:            {}:{}", server.bind, server.port);
    println!("  request_logging: {}", server.request_logging);
    if !server.cors_origins.is_empty() {
        println!("  cors_origins:    {}", server.cors_origins.join(", "));
    }
    println!();

    let session = config.session();
    let secret_status = if session.resolve_secret().is_ok() {
        "set"
    } else {
        "missing"
    };
    println!("Session:");
    println!("  connection_type: {}", session.connection_type);
    println!("  only_one:        {}", session.policy.only_one);
    println!("  ttl:             {}s", session.policy.ttl);
    println!("  secret:          {}", secret_status);
    if let Some(ref path) = session.connection.path {
        println!("  path:            {}", path.display());
    }
    if let Some(ref database) = session.connection.database {
        println!("  database:        {}", database);
    }
    println!();

    let rate_limit = config.rate_limit();
    let window = match rate_limit.decay_interval.to_duration() {
        Ok(duration) => servet_config::format_interval(duration),
        Err(e) => format!("invalid ({})", e),
    };
    println!("Rate limit:");
    println!("  enabled:         {}", rate_limit.enabled);
    println!("  threshold:       {}", rate_limit.threshold);
    println!("  decay_interval:  {}", window);

    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        servet_config::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    servet_config::save_config(&ServetConfig::starter(), &path)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!(
        "  export {}=...   # payload encryption secret",
        servet_config::SECRET_ENV
    );
    println!("  servet config show                 # verify configuration");
    println!("  servet start                       # run the server");

    Ok(())
}

fn cmd_path() -> Result<()> {
    if let Some(path) = servet_config::config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}
