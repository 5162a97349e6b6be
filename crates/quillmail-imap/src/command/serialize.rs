//! Command serialization helpers.

/// Writes `s` as an IMAP quoted string.
///
/// Backslash becomes `\\` and double quote becomes `\"`.
pub fn write_quoted(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}
