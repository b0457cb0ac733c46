//! Client interface for interacting with the Coordinator.
//!
//! The `CoordinatorHandle` is a cheap-to-clone interface for handing events
//! to the coordinator. Every method races its handoff against the global
//! shutdown token, so no caller stays blocked once shutdown is raised.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `CoordinatorError::ShutDown`

use std::net::SocketAddr;

use kvs_core::{SessionId, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::commands::{Counter, CoordinatorCommand, CoordinatorError, Operation};

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Handle for interacting with the coordinator.
///
/// # Usage
///
/// ```ignore
/// let handle = coordinator_handle.clone();
///
/// handle.apply(Operation::Delete { key: "user".into() }).await?;
/// let values = handle.get("user").await?;
/// let active = handle.count(Counter::Active).await?;
/// ```
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Command sender to the coordinator
    sender: mpsc::Sender<CoordinatorCommand>,

    /// Global shutdown signal
    shutdown: CancellationToken,
}

impl CoordinatorHandle {
    /// Creates a new coordinator handle.
    pub fn new(sender: mpsc::Sender<CoordinatorCommand>, shutdown: CancellationToken) -> Self {
        Self { sender, shutdown }
    }

    /// Hands a command to the coordinator unless shutdown wins the race.
    async fn send(&self, cmd: CoordinatorCommand) -> Result<(), CoordinatorError> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(CoordinatorError::ShutDown),

            result = self.sender.send(cmd) => {
                result.map_err(|_| CoordinatorError::ShutDown)
            }
        }
    }

    /// Hands an accepted connection to the coordinator.
    ///
    /// If shutdown wins, the connection is dropped, which closes it.
    pub async fn register(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Register { stream, peer }).await
    }

    /// Asks the coordinator to remove a session.
    pub async fn remove(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Remove { session_id }).await
    }

    /// Hands a store operation to the coordinator.
    ///
    /// Returns once the operation is queued, not once it is applied.
    pub async fn apply(&self, operation: Operation) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Apply(operation)).await
    }

    /// Reads every value stored under `key`.
    pub async fn get(&self, key: impl Into<String>) -> Result<Vec<Value>, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.apply(Operation::Get {
            key: key.into(),
            respond_to: tx,
        })
        .await?;
        self.await_reply(rx).await
    }

    /// Reads one of the coordinator's counters.
    pub async fn count(&self, counter: Counter) -> Result<usize, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Count {
            counter,
            respond_to: tx,
        })
        .await?;
        self.await_reply(rx).await
    }

    /// Waits for a reply, giving up if shutdown is raised first.
    pub async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, CoordinatorError> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(CoordinatorError::ShutDown),

            reply = rx => reply.map_err(|_| CoordinatorError::ShutDown),
        }
    }

    /// The global shutdown token shared with the coordinator.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
