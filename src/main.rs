//! Socksgate - Token SOCKS5 Gateway and Reverse Tunnel
//!
//! This is the main entry point for the Socksgate application.

use anyhow::Result;
use clap::Parser;
use socksgate::config::load_config;
use socksgate::{run_agent, run_gateway, run_tunnel};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Socksgate - Token SOCKS5 gateway with a multiplexed reverse tunnel
#[derive(Parser, Debug)]
#[command(name = "socksgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

type Role = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Socksgate v{}", socksgate::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx_clone.send(true);
    });

    let mut roles: Vec<(&str, Role)> = Vec::new();
    if let Some(gateway) = config.gateway {
        roles.push(("gateway", Box::pin(run_gateway(gateway, shutdown_tx.subscribe()))));
    }
    if let Some(tunnel) = config.tunnel {
        roles.push(("tunnel", Box::pin(run_tunnel(tunnel, shutdown_tx.subscribe()))));
    }
    if let Some(agent) = config.agent {
        roles.push(("agent", Box::pin(run_agent(agent, shutdown_tx.subscribe()))));
    }

    let handles: Vec<_> = roles
        .into_iter()
        .map(|(name, role)| (name, tokio::spawn(role)))
        .collect();

    let mut failed = None;
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => info!("{} stopped", name),
            Ok(Err(e)) => {
                error!("{} failed: {:#}", name, e);
                failed.get_or_insert(e);
            }
            Err(e) => {
                error!("{} task panicked: {}", name, e);
                failed.get_or_insert(e.into());
            }
        }
    }

    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                error!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
