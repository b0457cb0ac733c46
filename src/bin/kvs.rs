//! kvs - interactive client for kvsd
//!
//! Reads requests from stdin, one per line, and prints every response
//! line the server sends.
//!
//! # Usage
//!
//! ```bash
//! kvs
//! Put:user:alice
//! Get:user
//! user:alice
//!
//! # Scripted
//! printf 'Put:user:bob\nGet:user\n' | kvs --server 10.0.0.5:9999
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{stdin, stdout, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kvs_client::client::DEFAULT_SERVER;
use kvs_client::{ClientConfig, KvClient, SessionEnd};

/// kvs - key-value client
#[derive(Parser, Debug)]
#[command(name = "kvs", version, about)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = 5)]
    attempts: u32,

    /// Milliseconds to keep printing responses after stdin ends
    #[arg(long, default_value_t = 250)]
    linger_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries responses only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("kvs_client=warn".parse()?))
        .init();

    let config = ClientConfig {
        server: args.server,
        max_attempts: args.attempts,
        linger: Duration::from_millis(args.linger_ms),
        ..Default::default()
    };

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Received Ctrl+C");
            ctrl_c_token.cancel();
        }
    });

    let client = KvClient::new(config, cancel_token);
    let connection = client.connect().await.context("Could not reach the server")?;

    let (end, summary) = client
        .run(connection, BufReader::new(stdin()), stdout())
        .await
        .context("Session failed")?;

    if end == SessionEnd::ServerClosed {
        info!(received = summary.received, "Server closed the connection");
    } else {
        info!(end = ?end, received = summary.received, "Disconnected");
    }
    Ok(())
}
