//! Accept loop.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorHandle;

/// Accepts connections and hands each one to the coordinator.
pub struct Acceptor {
    listener: TcpListener,
    coordinator: CoordinatorHandle,
    shutdown: CancellationToken,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        coordinator: CoordinatorHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            coordinator,
            shutdown,
        }
    }

    /// Runs until shutdown. The listener is closed when this returns.
    pub async fn run(self) {
        let mut accepted: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Acceptor shutdown requested");
                    break;
                }

                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        accepted += 1;
                        debug!(peer = %peer, "Accepted connection");

                        // Races shutdown; on failure the stream is dropped (closed)
                        if self.coordinator.register(stream, peer).await.is_err() {
                            debug!(peer = %peer, "Coordinator gone, dropping connection");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        // Continue accepting other connections
                    }
                },
            }
        }

        info!(accepted, "Acceptor stopped, listener closed");
    }
}
