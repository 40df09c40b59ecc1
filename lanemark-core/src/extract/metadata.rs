/// Inline `[key::value]` annotations.
///
/// `recur` and `remind` are claimed by later stages and skipped here. Two
/// legacy unbracketed spellings, `progress::40%` and `project::name`, are
/// accepted when the bracketed form did not already supply the key.
use std::collections::BTreeMap;

use regex::Regex;
use std::sync::LazyLock;

use super::{cut_spans, Extraction};
use crate::types::{MetadataValue, PROGRESS_KEY, PROJECT_KEY};

pub const NOTE_KEY: &str = "note";
const RESERVED_KEYS: &[&str] = &["recur", "remind"];

static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z][\w-]*)::([^\]\n]*)\]").unwrap());

static LEGACY_PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(progress::(\d+)%?)(?:\s|$)").unwrap());

static LEGACY_PROJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(project::([^\s\[\]]+))").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTags {
    pub entries: BTreeMap<String, MetadataValue>,
    pub note_path: Option<String>,
    /// `(key, raw token)` for every match in line order, repeats included.
    /// The note token is not listed.
    pub tokens: Vec<(String, String)>,
}

pub fn extract_metadata(text: &str) -> Option<Extraction<MetadataTags>> {
    let mut tags = MetadataTags::default();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut matched: Vec<String> = Vec::new();
    let mut tokens: Vec<(usize, String, String)> = Vec::new();

    for caps in BRACKETED_RE.captures_iter(text) {
        let (Some(whole), Some(key), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let key = key.as_str();
        if RESERVED_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
            continue;
        }
        spans.push((whole.start(), whole.end()));
        matched.push(whole.as_str().to_string());
        tokens.push((whole.start(), key.to_string(), whole.as_str().to_string()));
        tags.entries
            .entry(key.to_string())
            .or_insert_with(|| decode_value(key, value.as_str()));
    }

    let bracketed = spans.clone();
    let inside_brackets =
        |start: usize, end: usize| bracketed.iter().any(|&(s, e)| start < e && end > s);

    if !tags.entries.contains_key(PROGRESS_KEY) {
        if let Some(m) = LEGACY_PROGRESS_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .filter(|m| !inside_brackets(m.start(), m.end()))
        {
            spans.push((m.start(), m.end()));
            matched.push(m.as_str().to_string());
            tokens.push((m.start(), PROGRESS_KEY.to_string(), m.as_str().to_string()));
            let raw = &m.as_str()[PROGRESS_KEY.len() + 2..];
            tags.entries
                .insert(PROGRESS_KEY.to_string(), decode_value(PROGRESS_KEY, raw));
        }
    }

    if !tags.entries.contains_key(PROJECT_KEY) {
        let legacy = LEGACY_PROJECT_RE
            .captures(text)
            .and_then(|caps| Some((caps.get(1)?, caps.get(2)?)))
            .filter(|(m, _)| !inside_brackets(m.start(), m.end()));
        if let Some((m, value)) = legacy {
            spans.push((m.start(), m.end()));
            matched.push(m.as_str().to_string());
            tokens.push((m.start(), PROJECT_KEY.to_string(), m.as_str().to_string()));
            tags.entries.insert(
                PROJECT_KEY.to_string(),
                MetadataValue::Text(value.as_str().to_string()),
            );
        }
    }

    if spans.is_empty() {
        return None;
    }

    if let Some(note) = tags.entries.remove(NOTE_KEY) {
        tags.note_path = Some(note.to_string());
    }

    tokens.sort_unstable_by_key(|(start, _, _)| *start);
    tags.tokens = tokens
        .into_iter()
        .filter(|(_, key, _)| key != NOTE_KEY)
        .map(|(_, key, raw)| (key, raw))
        .collect();

    spans.sort_unstable();
    let rest = cut_spans(text, &spans);

    Some(Extraction {
        value: tags,
        matched: matched.join(" "),
        rest,
    })
}

fn decode_value(key: &str, raw: &str) -> MetadataValue {
    let raw = raw.trim();
    if key == PROGRESS_KEY {
        if let Ok(n) = raw.trim_end_matches('%').trim().parse::<i64>() {
            return MetadataValue::Number(n);
        }
    }
    MetadataValue::Text(raw.to_string())
}

/// Text form used when writing a value back into a line.
pub fn encode_value(key: &str, value: &MetadataValue) -> String {
    match value {
        MetadataValue::Number(n) if key == PROGRESS_KEY => format!("{}%", n),
        other => other.to_string(),
    }
}
