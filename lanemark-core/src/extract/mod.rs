/// Scalar extractors for a single card line.
///
/// Each extractor is total: it either finds its token and hands back the
/// decoded value together with the line minus that token, or returns `None`
/// and the caller keeps the text unchanged. `extract_line` runs them in the
/// fixed order the card grammar relies on, threading the residual text from
/// one stage to the next.
pub mod date;
pub mod id_marker;
pub mod metadata;
pub mod reminder;
pub mod tags;

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use crate::recurrence::{self, RecurrencePattern};
use crate::types::MetadataValue;

/// One extractor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub value: T,
    /// Source text that produced `value`.
    pub matched: String,
    /// Input with the match removed, trimmed.
    pub rest: String,
}

/// Everything decoded from the text after a card's checkbox.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineFields {
    pub id: Option<String>,
    pub metadata: BTreeMap<String, MetadataValue>,
    /// Raw metadata tokens in line order.
    pub metadata_tokens: Vec<(String, String)>,
    pub note_path: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub recurrence: Option<RecurrencePattern>,
    pub reminder: Option<String>,
    pub title: String,
}

pub fn extract_line(text: &str, natural_dates: bool, today: NaiveDate) -> LineFields {
    let mut fields = LineFields::default();
    let mut rest = text.trim().to_string();

    if let Some(hit) = id_marker::extract_id_marker(&rest) {
        fields.id = Some(hit.value);
        rest = hit.rest;
    }

    if let Some(hit) = metadata::extract_metadata(&rest) {
        fields.metadata = hit.value.entries;
        fields.metadata_tokens = hit.value.tokens;
        fields.note_path = hit.value.note_path;
        rest = hit.rest;
    }

    // Tags are read but left in the title.
    fields.tags = tags::extract_hashtags(&rest);

    if let Some(hit) = date::extract_due(&rest, natural_dates, today) {
        fields.due_date = hit.value.date;
        fields.due_time = hit.value.time;
        rest = hit.rest;
    }

    if let Some(hit) = recurrence::extract_recurrence(&rest) {
        fields.recurrence = Some(hit.value);
        rest = hit.rest;
    }

    if let Some(hit) = reminder::extract_reminder(&rest) {
        fields.reminder = Some(hit.value);
        rest = hit.rest;
    }

    fields.title = rest;
    fields
}

/// Remove `text[start..end]`, joining the two sides with a single space.
pub(crate) fn cut(text: &str, start: usize, end: usize) -> String {
    cut_spans(text, &[(start, end)])
}

/// Remove several sorted, non-overlapping spans at once.
pub(crate) fn cut_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut pieces: Vec<&str> = Vec::with_capacity(spans.len() + 1);
    let mut pos = 0;
    for &(start, end) in spans {
        pieces.push(&text[pos..start]);
        pos = end;
    }
    pieces.push(&text[pos..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
