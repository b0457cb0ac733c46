//! Coordinator actor - owns the session table, the store and the counters.
//!
//! The Coordinator is the single owner of shared server state. It receives
//! commands via an mpsc channel and handles them one at a time, so table,
//! counters and store are always mutually consistent without a lock.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller gave up waiting)

use std::collections::HashMap;
use std::net::SocketAddr;

use kvs_core::{KvStore, SessionId};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::commands::{CoordinatorCommand, Counters, Operation};
use super::handle::CoordinatorHandle;
use crate::server::connection::{spawn_session, SessionContext, SessionLimits};

/// A tracked session.
///
/// The connection halves are owned by the session's reader and writer
/// tasks; cancelling `termination` makes both exit and drop them, which
/// closes the connection.
struct SessionEntry {
    peer: SocketAddr,
    termination: CancellationToken,
}

// ============================================================================
// Coordinator
// ============================================================================

/// The coordinator actor.
///
/// # Ownership
///
/// The coordinator owns:
/// - `sessions`: every registered, not yet removed session
/// - `store`: the storage collaborator
/// - `counters`: active and dropped session counts
///
/// Presence in `sessions` means the session's reader and writer are still
/// allowed to run.
pub struct Coordinator {
    /// Command receiver
    receiver: mpsc::Receiver<CoordinatorCommand>,

    /// Handed to every session so it can talk back to the coordinator
    handle: CoordinatorHandle,

    /// Storage collaborator
    store: Box<dyn KvStore>,

    /// Active session table
    sessions: HashMap<SessionId, SessionEntry>,

    counters: Counters,

    /// Next identifier to hand out
    next_id: SessionId,

    /// Global shutdown signal
    shutdown: CancellationToken,

    /// Limits applied to each session
    limits: SessionLimits,
}

impl Coordinator {
    /// Creates a new coordinator.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `handle` - Handle wrapping the sending side of `receiver`
    /// * `store` - Storage collaborator, owned exclusively from here on
    /// * `limits` - Mailbox capacity and line length for each session
    pub fn new(
        receiver: mpsc::Receiver<CoordinatorCommand>,
        handle: CoordinatorHandle,
        store: Box<dyn KvStore>,
        limits: SessionLimits,
    ) -> Self {
        let shutdown = handle.shutdown_token().clone();
        Self {
            receiver,
            handle,
            store,
            sessions: HashMap::new(),
            counters: Counters::default(),
            next_id: SessionId::new(1),
            shutdown,
            limits,
        }
    }

    /// Runs the coordinator event loop.
    ///
    /// Handles commands until shutdown is raised. Shutdown is checked before
    /// every command, so nothing queued behind it is handled.
    pub async fn run(mut self) {
        info!("Coordinator starting");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.handle_shutdown();
                    break;
                }

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("Coordinator channel closed");
                        self.handle_shutdown();
                        break;
                    }
                },
            }
        }

        info!(
            active = self.counters.active,
            dropped = self.counters.dropped,
            "Coordinator stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Register { stream, peer } => {
                self.handle_register(stream, peer);
            }
            CoordinatorCommand::Remove { session_id } => {
                self.handle_remove(session_id);
            }
            CoordinatorCommand::Apply(operation) => {
                self.handle_apply(operation);
            }
            CoordinatorCommand::Count {
                counter,
                respond_to,
            } => {
                // Ignore send error - caller may have stopped waiting
                let _ = respond_to.send(self.counters.get(counter));
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Tracks a new connection and starts its reader and writer.
    fn handle_register(&mut self, stream: TcpStream, peer: SocketAddr) {
        let session_id = self.next_id;
        self.next_id = session_id.next();

        let termination = self.shutdown.child_token();
        let context = SessionContext {
            session_id,
            coordinator: self.handle.clone(),
            termination: termination.clone(),
            shutdown: self.shutdown.clone(),
            limits: self.limits,
        };

        self.sessions
            .insert(session_id, SessionEntry { peer, termination });
        self.counters.active += 1;

        spawn_session(stream, context);

        info!(
            session_id = %session_id,
            peer = %peer,
            active = self.counters.active,
            "Session registered"
        );
    }

    /// Removes a session if it is still tracked.
    ///
    /// Reader and writer may both ask for removal of the same session, and
    /// either may race shutdown; every request after the first is a no-op.
    fn handle_remove(&mut self, session_id: SessionId) {
        let Some(entry) = self.sessions.remove(&session_id) else {
            debug!(session_id = %session_id, "Session already removed");
            return;
        };

        self.counters.active = self.counters.active.saturating_sub(1);
        self.counters.dropped += 1;
        entry.termination.cancel();

        info!(
            session_id = %session_id,
            peer = %entry.peer,
            active = self.counters.active,
            dropped = self.counters.dropped,
            "Session removed"
        );
    }

    /// Applies a store operation.
    fn handle_apply(&mut self, operation: Operation) {
        trace!(op = operation.kind(), key = operation.key(), "Applying operation");

        match operation {
            Operation::Put { key, value } => self.store.put(&key, value),
            Operation::Get { key, respond_to } => {
                // The slot is buffered; a reader that gave up just drops it
                let _ = respond_to.send(self.store.get(&key));
            }
            Operation::Delete { key } => self.store.delete(&key),
            Operation::Update { key, old, new } => self.store.update(&key, &old, new),
        }
    }

    /// Signals every tracked session to terminate.
    ///
    /// Counters are left as they are; the coordinator stops answering
    /// after this.
    fn handle_shutdown(&mut self) {
        info!(
            active = self.counters.active,
            "Coordinator shutting down, terminating sessions"
        );

        for (session_id, entry) in self.sessions.drain() {
            entry.termination.cancel();
            debug!(session_id = %session_id, peer = %entry.peer, "Session terminated");
        }
    }
}
