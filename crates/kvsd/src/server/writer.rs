//! Session writer: drains the mailbox to the connection.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::debug;

use super::connection::SessionContext;

/// Why a writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// The reader dropped its end and everything queued was written.
    MailboxClosed,
    /// Writing to the connection failed.
    WriteError,
    /// The session was removed or the server is shutting down.
    Terminated,
}

/// Writes queued response lines to one connection, one at a time.
///
/// Lines already in the mailbox are written even after the reader has
/// gone; only termination or a failed write cuts the queue short.
pub struct SessionWriter<W> {
    writer: BufWriter<W>,
    mailbox: mpsc::Receiver<String>,
    context: SessionContext,
}

impl<W> SessionWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, mailbox: mpsc::Receiver<String>, context: SessionContext) -> Self {
        Self {
            writer: BufWriter::new(writer),
            mailbox,
            context,
        }
    }

    pub async fn run(mut self) -> WriterExit {
        let exit = self.drain().await;

        debug!(session_id = %self.context.session_id, exit = ?exit, "Writer stopped");

        // A dead peer may never wake an idle reader
        if exit == WriterExit::WriteError {
            self.context.request_removal().await;
        }
        exit
    }

    async fn drain(&mut self) -> WriterExit {
        loop {
            let line = tokio::select! {
                biased;

                _ = self.context.shutdown.cancelled() => return WriterExit::Terminated,
                _ = self.context.termination.cancelled() => return WriterExit::Terminated,

                line = self.mailbox.recv() => match line {
                    Some(line) => line,
                    None => return WriterExit::MailboxClosed,
                },
            };

            let written = tokio::select! {
                biased;

                _ = self.context.shutdown.cancelled() => return WriterExit::Terminated,
                _ = self.context.termination.cancelled() => return WriterExit::Terminated,

                result = write_line(&mut self.writer, &line) => result,
            };

            if let Err(e) = written {
                debug!(session_id = %self.context.session_id, error = %e, "Write failed");
                return WriterExit::WriteError;
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
