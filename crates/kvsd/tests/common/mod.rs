//! Shared helpers for the TCP integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`. The panic-free behavior of
//! production code is checked through assertions.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kvs_core::{KvStore, MemoryStore};
use kvs_protocol::Request;
use kvsd::config::ServerConfig;
use kvsd::server::KeyValueServer;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single wait for a response line
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on waiting for a counter to reach a value
pub const COUNTER_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between counter checks
pub const COUNTER_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Server
// ============================================================================

/// A running server on an ephemeral loopback port.
pub struct TestServer {
    pub server: KeyValueServer,
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(Box::new(MemoryStore::new()), ServerConfig::default()).await
    }

    pub async fn spawn_with_config(config: ServerConfig) -> Self {
        Self::spawn_with(Box::new(MemoryStore::new()), config).await
    }

    pub async fn spawn_with(store: Box<dyn KvStore>, config: ServerConfig) -> Self {
        let mut server = KeyValueServer::new(store, config);
        let bound = server.start(0).await.expect("start server");
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port()));
        Self { server, addr }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient::new(stream)
    }

    pub async fn active(&self) -> usize {
        self.server.count_active().await.expect("count active")
    }

    pub async fn dropped(&self) -> usize {
        self.server.count_dropped().await.expect("count dropped")
    }

    /// Polls until the active count equals `expected`.
    pub async fn wait_for_active(&self, expected: usize) {
        let start = Instant::now();
        loop {
            let active = self.active().await;
            if active == expected {
                return;
            }
            assert!(
                start.elapsed() < COUNTER_WAIT_TIMEOUT,
                "active stuck at {active}, expected {expected}"
            );
            sleep(COUNTER_POLL_INTERVAL).await;
        }
    }

    /// Polls until the dropped count equals `expected`.
    pub async fn wait_for_dropped(&self, expected: usize) {
        let start = Instant::now();
        loop {
            let dropped = self.dropped().await;
            if dropped == expected {
                return;
            }
            assert!(
                start.elapsed() < COUNTER_WAIT_TIMEOUT,
                "dropped stuck at {dropped}, expected {expected}"
            );
            sleep(COUNTER_POLL_INTERVAL).await;
        }
    }
}

// ============================================================================
// Test Client
// ============================================================================

static MARKER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Raw line client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    marker_key: String,
}

impl TestClient {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        let n = MARKER_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            reader: BufReader::new(reader),
            writer,
            marker_key: format!("__marker_{n}"),
        }
    }

    /// Sends raw bytes as-is.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Sends one line, appending the terminator.
    pub async fn send_line(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send(&mut self, request: Request) {
        self.send_line(&request.to_string()).await;
    }

    pub async fn put(&mut self, key: &str, value: &str) {
        self.send(Request::put(key, value)).await;
    }

    /// Receives one response line without its terminator.
    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let read = timeout(RESPONSE_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("response in time")
            .expect("read response");
        assert!(read > 0, "connection closed while waiting for a response");
        line.trim_end_matches('\n').to_string()
    }

    /// Sends `Get` and returns every value line it produced.
    ///
    /// A private marker key is queried right after; its line marks the end
    /// of the `Get` output, so an empty result is detected without sleeping.
    pub async fn get_all(&mut self, key: &str) -> Vec<String> {
        let mark = self.marker_key.clone();
        let marker = format!("{mark}:end");
        self.send_line(&format!("Get:{key}\nDelete:{mark}\nPut:{mark}:end\nGet:{mark}"))
            .await;

        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await;
            if line == marker {
                return lines;
            }
            lines.push(line);
        }
    }

    /// Values from [`get_all`](Self::get_all) with the `key:` prefix removed.
    pub async fn get_values(&mut self, key: &str) -> Vec<String> {
        let prefix = format!("{key}:");
        self.get_all(key)
            .await
            .into_iter()
            .map(|line| {
                line.strip_prefix(&prefix)
                    .unwrap_or_else(|| panic!("line {line:?} lacks prefix {prefix:?}"))
                    .to_string()
            })
            .collect()
    }

    /// Waits until the server closes the connection.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1024];
        let start = Instant::now();
        loop {
            let remaining = RESPONSE_TIMEOUT.saturating_sub(start.elapsed());
            match timeout(remaining, self.reader.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return,
                // Drain anything still in flight
                Ok(Ok(_)) => continue,
                Err(_) => panic!("connection not closed within {RESPONSE_TIMEOUT:?}"),
            }
        }
    }
}
