//! kvsd - concurrent multi-value key-value server
//!
//! Listens for line-oriented TCP clients and serves Put/Get/Delete/Update
//! requests from an in-memory store.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (9999)
//! kvsd
//!
//! # Pick a port, or layer a TOML config file under the CLI flags
//! kvsd --port 7000
//! kvsd --config /etc/kvsd.toml
//!
//! # Override the port from the environment
//! KVS_PORT=7000 kvsd
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kvs_core::MemoryStore;
use kvsd::config::ServerConfig;
use kvsd::server::KeyValueServer;

/// kvsd - key-value server
#[derive(Parser, Debug)]
#[command(name = "kvsd", version, about)]
struct Args {
    /// TCP port to listen on (overrides the config file and KVS_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kvsd=info".parse()?)
                .add_directive("kvs_core=info".parse()?)
                .add_directive("kvs_protocol=info".parse()?),
        )
        .init();

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        port = config.port,
        mailbox_capacity = config.mailbox_capacity,
        "kvsd starting"
    );

    let port = config.port;
    let mut server = KeyValueServer::new(Box::new(MemoryStore::new()), config);
    let addr = server
        .start(port)
        .await
        .with_context(|| format!("Failed to start server on port {port}"))?;
    info!(addr = %addr, "Accepting connections");

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received");

    // Counting is not possible once closed
    match (server.count_active().await, server.count_dropped().await) {
        (Ok(active), Ok(dropped)) => info!(active, dropped, "Final session counts"),
        _ => error!("Could not read final session counts"),
    }

    server.close();
    server.join().await;

    info!("kvsd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
