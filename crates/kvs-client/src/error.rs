//! Error types for the kvs client.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Every connection attempt failed.
    ///
    /// Usually means kvsd is not running or listens on another port.
    #[error("Failed to connect to {addr} after {attempts} attempts: {error}. Is kvsd running?")]
    Connect {
        addr: String,
        attempts: u32,
        error: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,

    /// Reading or writing the connection or the local streams failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
