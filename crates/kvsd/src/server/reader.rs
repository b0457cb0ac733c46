//! Session reader: request lines in, store operations out.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed input is logged and skipped; it never ends the session
//! - Read errors end only this session

use std::io;

use kvs_core::Value;
use kvs_protocol::{format_value_line, Request};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use super::connection::SessionContext;
use crate::coordinator::Operation;

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// A complete line is in the buffer, terminator stripped.
    Line,
    /// The line exceeded the limit; its bytes were consumed and discarded.
    TooLong(usize),
    /// End of stream. A trailing unterminated fragment is discarded.
    Eof,
}

/// Reads one `\n`-terminated line into `buf` without buffering more than
/// `max` bytes of it.
pub(crate) async fn read_line_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut total = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if total > 0 {
                trace!(bytes = total, "Discarding unterminated trailing line");
            }
            buf.clear();
            return Ok(LineRead::Eof);
        }

        let (chunk_len, consumed, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i, i + 1, true),
            None => (available.len(), available.len(), false),
        };

        total += chunk_len;
        if total <= max {
            buf.extend_from_slice(&available[..chunk_len]);
        } else if !buf.is_empty() {
            buf.clear();
        }
        reader.consume(consumed);

        if complete {
            return Ok(if total > max {
                LineRead::TooLong(total)
            } else {
                LineRead::Line
            });
        }
    }
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer closed the connection.
    Eof,
    /// Reading from the connection failed.
    ReadError,
    /// The writer is gone, so nothing more can be delivered.
    MailboxClosed,
    /// The session was removed or the server is shutting down.
    Terminated,
}

/// Reads request lines from one connection and hands them to the
/// coordinator.
///
/// Operations from one connection are handed over strictly in the order
/// they were read. `Get` results are offered to the session mailbox and
/// dropped if it is full.
pub struct SessionReader<R> {
    reader: BufReader<R>,
    mailbox: mpsc::Sender<String>,
    context: SessionContext,
    line: Vec<u8>,
    /// Outbound messages dropped on a full mailbox, over the session's life
    dropped_messages: u64,
}

impl<R> SessionReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, mailbox: mpsc::Sender<String>, context: SessionContext) -> Self {
        Self {
            reader: BufReader::new(reader),
            mailbox,
            context,
            line: Vec::new(),
            dropped_messages: 0,
        }
    }

    /// Runs until the connection ends or the session is terminated, then
    /// asks the coordinator to remove the session.
    pub async fn run(mut self) -> ReaderExit {
        let exit = self.process_lines().await;

        debug!(
            session_id = %self.context.session_id,
            exit = ?exit,
            dropped_messages = self.dropped_messages,
            "Reader stopped"
        );

        if exit != ReaderExit::Terminated {
            self.context.request_removal().await;
        }
        exit
    }

    async fn process_lines(&mut self) -> ReaderExit {
        let max = self.context.limits.max_line_length;

        loop {
            let read = tokio::select! {
                biased;

                _ = self.context.shutdown.cancelled() => return ReaderExit::Terminated,
                _ = self.context.termination.cancelled() => return ReaderExit::Terminated,

                read = read_line_bounded(&mut self.reader, &mut self.line, max) => read,
            };

            match read {
                Ok(LineRead::Line) => {}
                Ok(LineRead::Eof) => return ReaderExit::Eof,
                Ok(LineRead::TooLong(len)) => {
                    debug!(
                        session_id = %self.context.session_id,
                        len,
                        max,
                        "Discarding oversized line"
                    );
                    continue;
                }
                Err(e) => {
                    debug!(session_id = %self.context.session_id, error = %e, "Read failed");
                    return ReaderExit::ReadError;
                }
            }

            let parsed = {
                let text = String::from_utf8_lossy(&self.line);
                if text.trim().is_empty() {
                    continue;
                }
                Request::parse(&text)
            };

            let request = match parsed {
                Ok(request) => request,
                Err(e) => {
                    trace!(session_id = %self.context.session_id, error = %e, "Ignoring malformed line");
                    continue;
                }
            };

            if let Err(exit) = self.dispatch(request).await {
                return exit;
            }
        }
    }

    /// Hands one request to the coordinator and, for `Get`, delivers the
    /// reply.
    async fn dispatch(&mut self, request: Request) -> Result<(), ReaderExit> {
        let key = request.key().to_string();
        let (operation, reply) = Operation::from_request(request);

        trace!(
            session_id = %self.context.session_id,
            op = operation.kind(),
            key = %key,
            "Dispatching"
        );

        let handed = tokio::select! {
            biased;

            _ = self.context.shutdown.cancelled() => false,
            _ = self.context.termination.cancelled() => false,

            result = self.context.coordinator.apply(operation) => result.is_ok(),
        };
        if !handed {
            return Err(ReaderExit::Terminated);
        }

        let Some(reply) = reply else {
            return Ok(());
        };

        let values = tokio::select! {
            biased;

            _ = self.context.shutdown.cancelled() => return Err(ReaderExit::Terminated),
            _ = self.context.termination.cancelled() => return Err(ReaderExit::Terminated),

            values = reply => values.map_err(|_| ReaderExit::Terminated)?,
        };

        self.deliver(&key, &values)
    }

    /// Offers one response line per value to the mailbox without waiting.
    fn deliver(&mut self, key: &str, values: &[Value]) -> Result<(), ReaderExit> {
        let mut dropped = 0u64;

        for value in values {
            match self.mailbox.try_send(format_value_line(key, value)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Closed(_)) => return Err(ReaderExit::MailboxClosed),
            }
        }

        if dropped > 0 {
            self.dropped_messages += dropped;
            debug!(
                session_id = %self.context.session_id,
                key = %key,
                dropped,
                total_dropped = self.dropped_messages,
                "Mailbox full, dropped response lines"
            );
        }
        Ok(())
    }
}
