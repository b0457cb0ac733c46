//! Per-session wiring.
//!
//! A registered connection is split into a read half and a write half.
//! Each half gets its own task:
//!
//! ```text
//!            ┌──────────────┐  Apply / Get reply  ┌──────────────┐
//!  socket ──▶│ SessionReader│◀──────────────────▶│ Coordinator  │
//!            └──────┬───────┘                     └──────────────┘
//!                   │ try_send (bounded mailbox)
//!                   ▼
//!            ┌──────────────┐
//!            │ SessionWriter│──▶ socket
//!            └──────────────┘
//! ```
//!
//! Both tasks watch the session's termination token and the global
//! shutdown token. The coordinator cancels the termination token when it
//! removes the session; the tasks then exit and drop their halves, which
//! closes the connection.

use kvs_core::SessionId;
use kvs_protocol::MAX_LINE_LENGTH;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::reader::SessionReader;
use super::writer::SessionWriter;
use crate::config::{ServerConfig, DEFAULT_MAILBOX_CAPACITY};
use crate::coordinator::CoordinatorHandle;

/// Limits applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Outbound messages buffered before new ones are dropped.
    pub mailbox_capacity: usize,

    /// Longest accepted request line, terminator excluded.
    pub max_line_length: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity,
            max_line_length: config.max_line_length,
        }
    }
}

/// Everything a session task needs besides its half of the connection.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub coordinator: CoordinatorHandle,
    /// Cancelled by the coordinator when the session is removed
    pub termination: CancellationToken,
    /// Global shutdown signal
    pub shutdown: CancellationToken,
    pub limits: SessionLimits,
}

impl SessionContext {
    /// Asks the coordinator to remove this session.
    ///
    /// Skipped when the session is already being torn down: termination
    /// means the coordinator removed it (or shut down) already.
    pub async fn request_removal(&self) {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => {}
            _ = self.termination.cancelled() => {}

            result = self.coordinator.remove(self.session_id) => {
                if result.is_err() {
                    debug!(session_id = %self.session_id, "Coordinator gone before removal");
                }
            }
        }
    }

    /// True once either the session or the whole server is shutting down.
    pub fn is_terminated(&self) -> bool {
        self.termination.is_cancelled() || self.shutdown.is_cancelled()
    }
}

/// Splits an accepted connection and starts its reader and writer tasks.
pub fn spawn_session(stream: TcpStream, context: SessionContext) {
    let (read_half, write_half) = stream.into_split();
    let (mailbox_tx, mailbox_rx) = mpsc::channel(context.limits.mailbox_capacity.max(1));

    debug!(session_id = %context.session_id, "Starting session tasks");

    tokio::spawn(SessionWriter::new(write_half, mailbox_rx, context.clone()).run());
    tokio::spawn(SessionReader::new(read_half, mailbox_tx, context).run());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorCommand;
    use std::time::Duration;

    fn create_context() -> (SessionContext, mpsc::Receiver<CoordinatorCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let context = SessionContext {
            session_id: SessionId::new(3),
            coordinator: CoordinatorHandle::new(cmd_tx, shutdown.clone()),
            termination: shutdown.child_token(),
            shutdown,
            limits: SessionLimits::default(),
        };
        (context, cmd_rx)
    }

    #[test]
    fn test_limits_from_config() {
        let config = ServerConfig {
            mailbox_capacity: 7,
            max_line_length: 64,
            ..Default::default()
        };
        let limits = SessionLimits::from(&config);
        assert_eq!(limits.mailbox_capacity, 7);
        assert_eq!(limits.max_line_length, 64);
    }

    #[tokio::test]
    async fn test_request_removal_sends_remove() {
        let (context, mut rx) = create_context();

        context.request_removal().await;

        match rx.recv().await {
            Some(CoordinatorCommand::Remove { session_id }) => {
                assert_eq!(session_id, SessionId::new(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_removal_skipped_after_termination() {
        let (context, mut rx) = create_context();
        context.termination.cancel();

        context.request_removal().await;

        assert!(context.is_terminated());
        let next = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(next.is_err(), "no command expected");
    }

    #[tokio::test]
    async fn test_shutdown_terminates_child() {
        let (context, _rx) = create_context();
        context.shutdown.cancel();
        assert!(context.termination.is_cancelled());
        assert!(context.is_terminated());
    }
}
