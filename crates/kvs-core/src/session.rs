//! Session identifiers.

use std::fmt;

/// Identity of one client connection.
///
/// Allocated by the coordinator in increasing order; never reused
/// within the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a session identifier from its raw number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the identifier that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
