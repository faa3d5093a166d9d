mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;

use okemcp_k8s::{DefaultsStore, Environment, Session};
use okemcp_tools::{ToolRouter, catalog};

use crate::config::Settings;

/// oke-mcp - read-only tool server for Oracle Container Engine for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "oke-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to ~/.config/oke-mcp/config.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the tool catalog as JSON and exit
    #[arg(long)]
    print_tools: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// OCI config profile
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// File holding stored defaults
    #[arg(long, value_name = "PATH")]
    defaults_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_tools {
        println!("{}", serde_json::to_string_pretty(&catalog())?);
        return Ok(());
    }

    let env = Environment::from_process();
    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_env(&env)?;
    if let Some(level) = args.log_level {
        settings.log_level = Some(level);
    }
    if let Some(profile) = args.profile {
        settings.oci.profile = Some(profile);
    }
    if let Some(path) = args.defaults_file {
        settings.defaults_file = Some(path);
    }

    // stdout carries responses; logs go to stderr
    let level: tracing::Level = settings
        .log_level()
        .parse()
        .with_context(|| format!("invalid log level '{}'", settings.log_level()))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(settings, env).await;
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    result
}

async fn run(settings: Settings, env: Environment) -> Result<()> {
    let session_config = settings.session_config()?;
    let defaults = DefaultsStore::new(settings.defaults_backend(), env.clone());
    let session = Session::connect(&session_config, defaults, env)
        .context("failed to initialise session")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = %session.resolver().profile_name(),
        client_ttl_secs = session.cache().ttl().as_secs(),
        "oke-mcp ready"
    );

    let router = ToolRouter::new(Arc::new(session));
    server::serve(router, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
