//! KVS Core - Shared types for the key-value server
//!
//! This crate provides the types shared between the server (kvsd),
//! the wire protocol and the client:
//! - [`KvStore`] - the storage collaborator the server drives
//! - [`MemoryStore`] - the bundled in-memory multi-value store
//! - [`SessionId`] - identity of one client connection
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod session;
pub mod store;

// Re-exports for convenience
pub use session::SessionId;
pub use store::{KvStore, MemoryStore, Value};
