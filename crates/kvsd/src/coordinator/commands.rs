//! Coordinator commands, operations and errors.
//!
//! This module defines the message types for communicating with the `Coordinator`:
//! - `CoordinatorCommand`: events handed to the coordinator
//! - `Operation`: a store operation produced by a session reader
//! - `CoordinatorError`: failures seen by callers of the handle

use std::fmt;
use std::net::SocketAddr;

use kvs_core::{SessionId, Value};
use kvs_protocol::Request;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

// ============================================================================
// Coordinator Commands
// ============================================================================

/// Events handed to the coordinator.
///
/// The coordinator handles exactly one command at a time. Shutdown is not a
/// command: it is raised through the shared cancellation token and takes
/// priority over anything still queued.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Track a freshly accepted connection and start its reader and writer.
    Register {
        /// The accepted connection
        stream: TcpStream,
        /// Remote address, kept for logging
        peer: SocketAddr,
    },

    /// Tear down a session. A no-op if it was already removed.
    Remove {
        /// Session to remove
        session_id: SessionId,
    },

    /// Apply a store operation.
    Apply(Operation),

    /// Read one of the counters.
    Count {
        /// Which counter to read
        counter: Counter,
        /// Channel to send the value
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Operations
// ============================================================================

/// A store operation, consumed exactly once by the coordinator.
#[derive(Debug)]
pub enum Operation {
    /// Append a value under a key.
    Put { key: String, value: Value },

    /// Read all values under a key.
    ///
    /// The oneshot slot holds one reply without a waiting receiver, so the
    /// coordinator never blocks on the caller.
    Get {
        key: String,
        respond_to: oneshot::Sender<Vec<Value>>,
    },

    /// Remove a key.
    Delete { key: String },

    /// Replace one value under a key.
    Update { key: String, old: Value, new: Value },
}

impl Operation {
    /// Converts a parsed request into an operation.
    ///
    /// For `Get`, also returns the receiving end of the response slot.
    pub fn from_request(request: Request) -> (Self, Option<oneshot::Receiver<Vec<Value>>>) {
        match request {
            Request::Put { key, value } => (
                Self::Put {
                    key,
                    value: value.into_bytes(),
                },
                None,
            ),
            Request::Get { key } => {
                let (tx, rx) = oneshot::channel();
                (
                    Self::Get {
                        key,
                        respond_to: tx,
                    },
                    Some(rx),
                )
            }
            Request::Delete { key } => (Self::Delete { key }, None),
            Request::Update { key, old, new } => (
                Self::Update {
                    key,
                    old: old.into_bytes(),
                    new: new.into_bytes(),
                },
                None,
            ),
        }
    }

    /// Name of the operation, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Put { .. } => "Put",
            Self::Get { .. } => "Get",
            Self::Delete { .. } => "Delete",
            Self::Update { .. } => "Update",
        }
    }

    /// The key the operation addresses.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. }
            | Self::Get { key, .. }
            | Self::Delete { key }
            | Self::Update { key, .. } => key,
        }
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Selects one of the coordinator's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Sessions currently registered.
    Active,
    /// Sessions removed since the server started.
    Dropped,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

/// Snapshot of the coordinator's counters.
///
/// `active` always equals the number of tracked sessions; `dropped` only
/// ever grows, by one per removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub active: usize,
    pub dropped: usize,
}

impl Counters {
    /// Returns the selected counter.
    pub fn get(&self, counter: Counter) -> usize {
        match counter {
            Counter::Active => self.active,
            Counter::Dropped => self.dropped,
        }
    }
}

// ============================================================================
// Coordinator Errors
// ============================================================================

/// Errors seen by callers of the coordinator handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The coordinator has shut down (or is shutting down) and no longer
    /// accepts commands.
    #[error("coordinator has shut down")]
    ShutDown,
}
