use regex::Regex;
use std::sync::LazyLock;

use super::{cut, Extraction};

static REMIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[remind::([^\]\n]+)\]").unwrap());

/// `[remind::duration]`; the duration is kept as written.
pub fn extract_reminder(text: &str) -> Option<Extraction<String>> {
    let caps = REMIND_RE.captures(text)?;
    let whole = caps.get(0)?;
    Some(Extraction {
        value: caps.get(1)?.as_str().trim().to_string(),
        matched: whole.as_str().to_string(),
        rest: cut(text, whole.start(), whole.end()),
    })
}
