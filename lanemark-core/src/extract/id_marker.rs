use regex::Regex;
use std::sync::LazyLock;

use super::{cut, Extraction};

/// `^identifier` at the very end of a line.
static ID_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)\^([A-Za-z0-9][A-Za-z0-9_-]*)\s*$").unwrap());

pub fn extract_id_marker(text: &str) -> Option<Extraction<String>> {
    let caps = ID_MARKER_RE.captures(text)?;
    let whole = caps.get(0)?;
    let id = caps.get(1)?;
    Some(Extraction {
        value: id.as_str().to_string(),
        matched: format!("^{}", id.as_str()),
        rest: cut(text, whole.start(), whole.end()),
    })
}

/// Split a lane heading's text into (title, identifier).
pub fn split_heading(text: &str) -> (String, Option<String>) {
    match extract_id_marker(text) {
        Some(hit) => (hit.rest, Some(hit.value)),
        None => (text.trim().to_string(), None),
    }
}
