//! Request lines sent by clients.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Field separator on the wire.
const SEPARATOR: char = ':';

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Append `value` to the values stored under `key`.
    Put { key: String, value: String },

    /// Fetch every value stored under `key`.
    Get { key: String },

    /// Remove `key` and all of its values.
    Delete { key: String },

    /// Replace `old` with `new` among the values stored under `key`.
    Update {
        key: String,
        old: String,
        new: String,
    },
}

impl Request {
    /// Parses one request line.
    ///
    /// Surrounding whitespace (including the line terminator) is ignored.
    /// Command names are case-sensitive. `Get` and `Delete` ignore any
    /// fields after the key.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (command, rest) = match line.split_once(SEPARATOR) {
            Some((command, rest)) => (command, Some(rest)),
            None => (line, None),
        };

        let name = match command {
            "Put" => "Put",
            "Get" => "Get",
            "Delete" => "Delete",
            "Update" => "Update",
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };

        let rest = rest.ok_or(ParseError::MissingField {
            command: name,
            field: "key",
        })?;

        match name {
            "Put" => {
                let (key, value) = split_field(rest, name, "value")?;
                Ok(Self::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "Update" => {
                let (key, tail) = split_field(rest, name, "old")?;
                let (old, new) = split_field(tail, name, "new")?;
                Ok(Self::Update {
                    key: key.to_string(),
                    old: old.to_string(),
                    new: new.to_string(),
                })
            }
            "Get" => Ok(Self::Get {
                key: first_field(rest).to_string(),
            }),
            _ => Ok(Self::Delete {
                key: first_field(rest).to_string(),
            }),
        }
    }

    /// The key this request addresses.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. }
            | Self::Get { key }
            | Self::Delete { key }
            | Self::Update { key, .. } => key,
        }
    }

    /// Creates a put request.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a get request.
    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    /// Creates a delete request.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Creates an update request.
    pub fn update(key: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
        Self::Update {
            key: key.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Splits off the next field; the remainder is kept whole.
fn split_field<'a>(
    input: &'a str,
    command: &'static str,
    missing: &'static str,
) -> Result<(&'a str, &'a str), ParseError> {
    input.split_once(SEPARATOR).ok_or(ParseError::MissingField {
        command,
        field: missing,
    })
}

fn first_field(input: &str) -> &str {
    input.split(SEPARATOR).next().unwrap_or(input)
}

impl FromStr for Request {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Formats the request as its wire line, without the terminator.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put { key, value } => write!(f, "Put:{key}:{value}"),
            Self::Get { key } => write!(f, "Get:{key}"),
            Self::Delete { key } => write!(f, "Delete:{key}"),
            Self::Update { key, old, new } => write!(f, "Update:{key}:{old}:{new}"),
        }
    }
}

/// Reasons a request line is rejected.
///
/// The server drops rejected lines silently; these exist for logging
/// and for clients that validate input before sending it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was blank.
    #[error("empty request line")]
    Empty,

    /// The command name is not one of Put, Get, Delete, Update.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required field is missing.
    #[error("{command} request is missing its {field}")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
}
