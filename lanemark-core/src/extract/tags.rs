use regex::Regex;
use std::sync::LazyLock;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([\w/-]+)").unwrap());

/// Hashtags in first-seen order, without the leading `#`, deduplicated.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in HASHTAG_RE.captures_iter(text) {
        if let Some(tag) = caps.get(1) {
            if !tags.iter().any(|t| t == tag.as_str()) {
                tags.push(tag.as_str().to_string());
            }
        }
    }
    tags
}

/// Whether `#tag` already appears verbatim in `text`.
pub fn contains_tag(text: &str, tag: &str) -> bool {
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .any(|m| m.as_str() == tag)
}

/// Remove every hashtag, collapsing the whitespace left behind.
pub fn strip_hashtags(text: &str) -> String {
    HASHTAG_RE
        .replace_all(text, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
