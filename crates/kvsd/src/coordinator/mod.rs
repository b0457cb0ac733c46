//! Serializing coordinator using the actor pattern.
//!
//! The coordinator is the only owner of the session table, the counters
//! and the store. Everything else talks to it by message.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Acceptor     │──┐ Register
//! └─────────────────┘  │
//! ┌─────────────────┐  │   ┌─────────────────┐      ┌─────────────────┐
//! │ SessionReader   │──┼──▶│   Coordinator   │─────▶│ Box<dyn KvStore>│
//! │ SessionWriter   │──┤   │                 │      └─────────────────┘
//! └─────────────────┘  │   │ HashMap<Session │
//! ┌─────────────────┐  │   │  Id, Entry>     │
//! │ KeyValueServer  │──┘   └─────────────────┘
//! └─────────────────┘  Apply / Remove / Count
//!                      (mpsc channel, oneshot replies)
//! ```
//!
//! Shutdown is a `CancellationToken` shared by every component. The
//! coordinator checks it before each command, so it wins over anything
//! still queued.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kvs_core::KvStore;

use crate::config::ServerConfig;
use crate::server::SessionLimits;

mod actor;
mod commands;
mod handle;

pub use actor::Coordinator;
pub use commands::{CoordinatorCommand, CoordinatorError, Counter, Counters, Operation};
pub use handle::CoordinatorHandle;

/// Spawns the coordinator and returns a handle for interacting with it.
///
/// The coordinator runs until `shutdown` is cancelled. The returned
/// `JoinHandle` completes once it has terminated every session.
///
/// # Example
///
/// ```no_run
/// use kvs_core::MemoryStore;
/// use kvsd::config::ServerConfig;
/// use kvsd::coordinator::{spawn_coordinator, Counter};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let shutdown = CancellationToken::new();
///     let (handle, task) = spawn_coordinator(
///         Box::new(MemoryStore::new()),
///         &ServerConfig::default(),
///         shutdown.clone(),
///     );
///
///     let active = handle.count(Counter::Active).await;
///
///     shutdown.cancel();
///     let _ = task.await;
/// }
/// ```
pub fn spawn_coordinator(
    store: Box<dyn KvStore>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
    let handle = CoordinatorHandle::new(cmd_tx, shutdown);

    let coordinator = Coordinator::new(
        cmd_rx,
        handle.clone(),
        store,
        SessionLimits::from(config),
    );
    let task = tokio::spawn(coordinator.run());

    (handle, task)
}
