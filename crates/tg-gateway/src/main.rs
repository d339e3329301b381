//! tn3270-gateway daemon
//!
//! Accepts TN3270 clients, authenticates them and relays them to the
//! backend host they pick from a menu.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tg_core::config::{self, GatewayConfig};
use tg_core::load_host_catalog;
use tg_gateway::auth::CredentialStore;
use tg_gateway::server::Listener;
use tg_gateway::GatewayState;

#[derive(Parser)]
#[command(name = "tn3270-gateway")]
#[command(about = "TN3270 gateway daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = config::default_config_path())]
    config: PathBuf,

    /// Plaintext listener port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// TLS listener port (overrides config)
    #[arg(long)]
    tls_port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Verbose output, same as --log-level debug
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tn3270-gateway starting...");

    // Load configuration
    let mut config: GatewayConfig = config::load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(port) = args.tls_port {
        config.tls.port = port;
    }
    config
        .validate()
        .with_context(|| format!("Invalid settings in {:?}", args.config))?;

    let default_catalog = load_host_catalog(&config.host_file)
        .with_context(|| format!("Failed to load default hosts from {:?}", config.host_file))?;

    let credentials = CredentialStore::load_from_file(&config.users_file)
        .with_context(|| format!("Failed to load credentials from {:?}", config.users_file))?;

    log_summary(&config, default_catalog.len(), credentials.len());

    let state = Arc::new(GatewayState::new(config, credentials, default_catalog));

    let mut endpoints = vec![state.config.plaintext_endpoint()];
    endpoints.extend(state.config.tls_endpoint());
    for endpoint in endpoints {
        let listener = Listener::new(endpoint, Arc::clone(&state));
        tokio::spawn(listener.run());
    }

    shutdown_signal().await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

fn log_summary(config: &GatewayConfig, hosts: usize, users: usize) {
    tracing::info!("Plaintext port: {}", config.port);
    tracing::info!("Default hosts: {} from {:?}", hosts, config.host_file);
    tracing::info!("Users: {} from {:?}", users, config.users_file);
    tracing::info!(
        "Timeouts: handshake {:?}, idle {:?}, connect {:?}",
        config.session.handshake_timeout,
        config.session.idle_timeout,
        config.relay.connect_timeout
    );

    if !config.tls.enabled {
        tracing::info!("TLS: disabled");
        return;
    }
    let missing = config.tls.missing_settings();
    if missing.is_empty() {
        tracing::info!(
            "TLS port: {} (TLS {} to {})",
            config.tls.port,
            config.tls.min_version,
            config.tls.max_version
        );
    } else {
        tracing::warn!(
            "TLS is enabled but not configured ({}); TLS listener will not start",
            missing.join(", ")
        );
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
    Ok(())
}
