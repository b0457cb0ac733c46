//! TCP front end of the key-value server.
//!
//! The server:
//! - Binds a TCP listener and runs an `Acceptor` on it
//! - Spawns the `Coordinator`, which owns sessions, counters and the store
//! - Starts a `SessionReader` and a `SessionWriter` per connection
//! - Shuts everything down through one `CancellationToken`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ KeyValueServer  │ start / close / count_*
//! └───────┬─────────┘
//!         │ spawns
//!         ▼
//! ┌─────────────────┐  Register   ┌─────────────────┐
//! │    Acceptor     │────────────▶│   Coordinator   │
//! │  (TcpListener)  │             │ sessions, store │
//! └─────────────────┘             └────────┬────────┘
//!                                          │ spawn_session
//!                                          ▼
//!                              ┌───────────────────────┐
//!                              │ SessionReader/Writer  │
//!                              │   (per connection)    │
//!                              └───────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-connection I/O errors end only that session
//! - Bind failures are returned from `start`

mod acceptor;
pub mod connection;
mod reader;
mod writer;

pub use acceptor::Acceptor;
pub use connection::{SessionContext, SessionLimits};
pub use reader::{ReaderExit, SessionReader};
pub use writer::{SessionWriter, WriterExit};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use kvs_core::KvStore;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::coordinator::{spawn_coordinator, CoordinatorError, CoordinatorHandle, Counter};

/// State that exists once the server has started.
struct Running {
    coordinator: CoordinatorHandle,
    local_addr: SocketAddr,
    acceptor_task: JoinHandle<()>,
    coordinator_task: JoinHandle<()>,
}

/// The key-value server.
///
/// # Example
///
/// ```no_run
/// use kvs_core::MemoryStore;
/// use kvsd::config::ServerConfig;
/// use kvsd::server::KeyValueServer;
///
/// # async fn run() -> Result<(), kvsd::server::ServerError> {
/// let mut server = KeyValueServer::new(Box::new(MemoryStore::new()), ServerConfig::default());
/// let addr = server.start(9999).await?;
/// println!("listening on {addr}");
///
/// let active = server.count_active().await?;
/// server.close();
/// # Ok(())
/// # }
/// ```
pub struct KeyValueServer {
    config: ServerConfig,

    /// Handed to the coordinator on start
    store: Option<Box<dyn KvStore>>,

    running: Option<Running>,

    /// Global shutdown signal
    shutdown: CancellationToken,
}

impl KeyValueServer {
    /// Creates a server around a store. Nothing runs until [`start`](Self::start).
    pub fn new(store: Box<dyn KvStore>, config: ServerConfig) -> Self {
        Self {
            config,
            store: Some(store),
            running: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Binds `port` on all interfaces and starts accepting connections.
    ///
    /// Port 0 picks an ephemeral port. Returns the bound address; the
    /// accept loop and coordinator keep running in the background.
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr, ServerError> {
        if self.shutdown.is_cancelled() {
            return Err(ServerError::ShutDown);
        }
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;

        let store = self.store.take().ok_or(ServerError::AlreadyStarted)?;
        let (coordinator, coordinator_task) =
            spawn_coordinator(store, &self.config, self.shutdown.clone());

        let acceptor = Acceptor::new(listener, coordinator.clone(), self.shutdown.clone());
        let acceptor_task = tokio::spawn(acceptor.run());

        info!(addr = %local_addr, "Key-value server listening");

        self.running = Some(Running {
            coordinator,
            local_addr,
            acceptor_task,
            coordinator_task,
        });
        Ok(local_addr)
    }

    /// Stops accepting connections and terminates every session.
    ///
    /// Returns without waiting for the tasks to unwind; use
    /// [`join`](Self::join) for that. Calling it again is a no-op.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Key-value server closing");
            self.shutdown.cancel();
        }
    }

    /// Number of currently registered sessions.
    pub async fn count_active(&self) -> Result<usize, ServerError> {
        self.count(Counter::Active).await
    }

    /// Number of sessions removed since the server started.
    pub async fn count_dropped(&self) -> Result<usize, ServerError> {
        self.count(Counter::Dropped).await
    }

    async fn count(&self, counter: Counter) -> Result<usize, ServerError> {
        if self.shutdown.is_cancelled() {
            return Err(ServerError::ShutDown);
        }
        let running = self.running.as_ref().ok_or(ServerError::NotStarted)?;
        let value = running.coordinator.count(counter).await?;
        debug!(counter = %counter, value, "Counter read");
        Ok(value)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits for the accept loop and the coordinator to stop.
    ///
    /// Only returns after [`close`](Self::close) has been called.
    pub async fn join(mut self) {
        if let Some(running) = self.running.take() {
            if let Err(e) = running.acceptor_task.await {
                debug!(error = %e, "Acceptor task ended abnormally");
            }
            if let Err(e) = running.coordinator_task.await {
                debug!(error = %e, "Coordinator task ended abnormally");
            }
        }
    }
}

impl Drop for KeyValueServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server not started")]
    NotStarted,

    #[error("Server has shut down")]
    ShutDown,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<CoordinatorError> for ServerError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::ShutDown => Self::ShutDown,
        }
    }
}
