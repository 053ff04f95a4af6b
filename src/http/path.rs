//! Request path handling
//!
//! Percent-decoding and lexical cleaning of URL paths. Routing and
//! resource lookup work on the decoded path; redirects carry it
//! re-encoded.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::borrow::Cow;

/// Bytes escaped when a decoded path goes back into a `Location` header
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A `%` not followed by two hex digits
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid URL escape \"{0}\"")]
pub struct InvalidEscape(pub String);

/// First malformed percent escape in `raw`, as written
pub fn find_invalid_escape(raw: &str) -> Option<InvalidEscape> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        match bytes.get(i + 1..i + 3) {
            Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => i += 3,
            _ => {
                let end = (i + 3).min(bytes.len());
                let shown = String::from_utf8_lossy(&bytes[i..end]).into_owned();
                return Some(InvalidEscape(shown));
            }
        }
    }
    None
}

/// Percent-decode a request path.
///
/// Decoded bytes that are not UTF-8 become U+FFFD.
pub fn decode_path(raw: &str) -> Result<Cow<'_, str>, InvalidEscape> {
    if let Some(err) = find_invalid_escape(raw) {
        return Err(err);
    }
    Ok(percent_decode_str(raw).decode_utf8_lossy())
}

/// Canonical form of a decoded path.
///
/// Collapses repeated slashes, drops `.` segments and resolves `..`
/// without climbing above the root. A trailing slash survives.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    if path.ends_with('/') && cleaned != "/" {
        cleaned.push('/');
    }
    cleaned
}

/// Re-encode a decoded path for use in a URL
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SEGMENT).to_string()
}
