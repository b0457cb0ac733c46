//! Connection client for the kvsd server.
//!
//! This module provides the `KvClient` which handles:
//! - Connecting to the server with exponential backoff
//! - Forwarding request lines from an input stream
//! - Copying response lines to an output stream
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::net::SocketAddr;
use std::time::Duration;

use kvs_protocol::Request;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Default server address.
pub const DEFAULT_SERVER: &str = "127.0.0.1:9999";

/// Configuration for the client.
///
/// # Example
///
/// ```rust
/// use kvs_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     server: "10.0.0.5:9999".to_string(),
///     max_attempts: 10,
///     ..Default::default()
/// };
/// assert_eq!(config.retry_initial_delay, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub server: String,

    /// Delay before the second connection attempt.
    pub retry_initial_delay: Duration,

    /// Upper bound on the delay between attempts.
    pub retry_max_delay: Duration,

    /// Growth factor of the delay after each failed attempt.
    pub retry_multiplier: f64,

    /// Connection attempts before giving up. At least one is always made.
    pub max_attempts: u32,

    /// How long to keep printing responses after the input ends.
    ///
    /// The protocol has no end-of-reply marker, so replies to the last
    /// requests can only be awaited for a fixed time.
    pub linger: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            retry_multiplier: 2.0,
            max_attempts: 5,
            linger: Duration::from_millis(250),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An open connection to the server.
pub struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one request as a wire line.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let line = format!("{request}\n");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next response line, or `None` once the server closed the connection.
    pub async fn recv_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

// ============================================================================
// Client
// ============================================================================

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The input ran out.
    InputClosed,
    /// The server closed the connection.
    ServerClosed,
    /// The cancellation token fired.
    Cancelled,
}

/// Line counts for one interactive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Requests sent to the server.
    pub sent: u64,
    /// Input lines that were not valid requests and were not sent.
    pub rejected: u64,
    /// Response lines received.
    pub received: u64,
}

/// Client for the kvsd server.
///
/// # Example
///
/// ```rust,ignore
/// use kvs_client::{ClientConfig, KvClient};
/// use tokio::io::{stdin, stdout, BufReader};
/// use tokio_util::sync::CancellationToken;
///
/// let client = KvClient::new(ClientConfig::default(), CancellationToken::new());
/// let connection = client.connect().await?;
/// let (end, summary) = client.run(connection, BufReader::new(stdin()), stdout()).await?;
/// ```
pub struct KvClient {
    config: ClientConfig,
    cancel_token: CancellationToken,
}

impl KvClient {
    #[must_use]
    pub fn new(config: ClientConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to the configured server, retrying with exponential backoff.
    pub async fn connect(&self) -> Result<Connection> {
        let mut delay = self.config.retry_initial_delay;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            debug!(attempt, server = %self.config.server, "Attempting to connect");

            let error = match TcpStream::connect(self.config.server.as_str()).await {
                Ok(stream) => {
                    let connection = Connection::new(stream)?;
                    info!(peer = %connection.peer_addr(), attempt, "Connected");
                    return Ok(connection);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(ClientError::Connect {
                    addr: self.config.server.clone(),
                    attempts: attempt,
                    error: error.to_string(),
                });
            }

            if attempt == 1 {
                warn!(server = %self.config.server, error = %error, "Server not reachable, will retry");
            } else {
                debug!(attempt, error = %error, "Connection attempt failed");
            }

            // Wait before retry, checking for cancellation
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Connection retry cancelled");
                    return Err(ClientError::Cancelled);
                }
                _ = sleep(delay) => {
                    let next_delay_ms = (delay.as_millis() as f64 * self.config.retry_multiplier) as u64;
                    delay = Duration::from_millis(next_delay_ms).min(self.config.retry_max_delay);
                }
            }
        }
    }

    /// Pumps request lines from `input` to the server and response lines
    /// from the server to `output` until one side ends.
    ///
    /// Input lines are validated first; blank lines are skipped and
    /// malformed ones are reported and not sent.
    pub async fn run<I, O>(
        &self,
        mut connection: Connection,
        input: I,
        mut output: O,
    ) -> Result<(SessionEnd, SessionSummary)>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut input = input.lines();
        let mut summary = SessionSummary::default();

        let end = loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break SessionEnd::Cancelled,

                line = connection.lines.next_line() => match line? {
                    Some(line) => {
                        write_line(&mut output, &line).await?;
                        summary.received += 1;
                    }
                    None => break SessionEnd::ServerClosed,
                },

                line = input.next_line() => match line? {
                    Some(line) => forward(&mut connection, &line, &mut summary).await?,
                    None => {
                        break self.linger(&mut connection, &mut output, &mut summary).await?;
                    }
                },
            }
        };

        info!(
            end = ?end,
            sent = summary.sent,
            rejected = summary.rejected,
            received = summary.received,
            "Session finished"
        );
        Ok((end, summary))
    }

    /// Keeps copying responses for the configured linger time.
    async fn linger<O>(
        &self,
        connection: &mut Connection,
        output: &mut O,
        summary: &mut SessionSummary,
    ) -> Result<SessionEnd>
    where
        O: AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.config.linger;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => return Ok(SessionEnd::Cancelled),

                line = connection.lines.next_line() => match line? {
                    Some(line) => {
                        write_line(output, &line).await?;
                        summary.received += 1;
                    }
                    None => return Ok(SessionEnd::ServerClosed),
                },

                _ = sleep_until(deadline) => return Ok(SessionEnd::InputClosed),
            }
        }
    }
}

async fn forward(
    connection: &mut Connection,
    line: &str,
    summary: &mut SessionSummary,
) -> Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }

    match Request::parse(line) {
        Ok(request) => {
            connection.send(&request).await?;
            summary.sent += 1;
        }
        Err(e) => {
            warn!(line = %line, error = %e, "Not sending malformed request");
            summary.rejected += 1;
        }
    }
    Ok(())
}

async fn write_line<O: AsyncWrite + Unpin>(output: &mut O, line: &str) -> Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
