//! kvs-client - line-oriented client for the kvsd key-value server
//!
//! - `client` - connecting with backoff and the interactive line pump
//! - `error` - `ClientError`

pub mod client;
pub mod error;

pub use client::{ClientConfig, Connection, KvClient, SessionEnd, SessionSummary};
pub use error::{ClientError, Result};
