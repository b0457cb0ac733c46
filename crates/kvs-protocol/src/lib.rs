//! KVS Protocol - Wire protocol for the key-value server
//!
//! Every request is one newline-terminated text line of colon-delimited
//! fields. The trailing field of `Put` and `Update` is taken as the rest of
//! the line and may itself contain colons.
//!
//! | Command | Format | Response |
//! |---|---|---|
//! | Put | `Put:<key>:<value>` | none |
//! | Get | `Get:<key>` | one `<key>:<value>` line per stored value |
//! | Delete | `Delete:<key>` | none |
//! | Update | `Update:<key>:<old>:<new>` | none |

pub mod request;
pub mod response;

pub use request::{ParseError, Request};
pub use response::{format_value_line, LINE_TERMINATOR};

/// Longest accepted request line in bytes, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 1_048_576;
