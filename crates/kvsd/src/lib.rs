//! kvsd - concurrent multi-value key-value server
//!
//! This crate provides the server side of kvs:
//! - `coordinator` - Actor owning the session table, counters and store
//! - `server` - TCP façade, accept loop and per-connection reader/writer
//! - `config` - Layered server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         kvsd                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │    Acceptor     │────▶│        Coordinator          │   │
//! │  │  (TcpListener)  │     │ (sessions, counters, store) │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │                       Get replies ▲     │ spawn_session     │
//! │                                   │     ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  SessionWriter  │◀────│       SessionReader         │   │
//! │  │  (mailbox 500)  │     │     (one per connection)    │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows a panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod coordinator;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use server::{KeyValueServer, ServerError};
