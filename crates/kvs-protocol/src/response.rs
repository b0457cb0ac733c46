//! Response lines sent back for `Get` requests.

/// Terminator appended to every response line.
pub const LINE_TERMINATOR: char = '\n';

/// Formats one `<key>:<value>` response line, terminator included.
///
/// The value is decoded as UTF-8 (invalid sequences are replaced) and
/// trimmed of surrounding whitespace.
pub fn format_value_line(key: &str, value: &[u8]) -> String {
    let value = String::from_utf8_lossy(value);
    format!("{key}:{}{LINE_TERMINATOR}", value.trim())
}
