use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::extract::tags;
use crate::recurrence::RecurrencePattern;

/// Header key that marks a document as a board. Injected when absent.
pub const MARKER_KEY: &str = "kanban-plugin";
pub const MARKER_VALUE: &str = "basic";

/// Metadata keys with dedicated meaning for the sync side.
pub const PROGRESS_KEY: &str = "progress";
pub const PROJECT_KEY: &str = "project";
pub const PRIORITY_KEY: &str = "priority";

/// Source text kept alongside the model so untouched spans serialize
/// verbatim. Never takes part in model equality.
#[derive(Debug, Clone)]
pub struct Retained<T>(pub(crate) Option<T>);

impl<T> Default for Retained<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> PartialEq for Retained<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Retained<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Some(value))
    }

    pub(crate) fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut T> {
        self.0.as_mut()
    }

    /// Whether the value was read from a document.
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct CardSource {
    /// Leading whitespace of the checkbox line.
    pub indent: String,
    /// The raw card line, terminator included.
    pub line: String,
    /// Byte offset of the checkbox mark inside `line`.
    pub mark_offset: usize,
    /// The line carried no `^id`; the card's identifier was allocated.
    pub id_generated: bool,
    /// Raw metadata tokens in line order, keyed by metadata key.
    pub metadata_tokens: Vec<(String, String)>,
    /// Fields as they were decoded from `line` and the content block.
    pub snapshot: Box<Card>,
    /// Index of each subtask's line within the content block.
    pub subtask_lines: Vec<usize>,
    /// Raw lines between this card's block and the next card.
    pub trailer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    /// Residual title text. Hashtags stay in here.
    pub title: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm")]
    pub due_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrencePattern>,
    /// Reminder lead time such as `1h` or `2d`, kept opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    /// Link to the external task record, written as `[note::path]`.
    #[serde(rename = "baseTaskPath", skip_serializing_if = "Option::is_none")]
    pub note_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Verbatim indented block below the card line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, MetadataValue>,
    #[serde(skip)]
    pub(crate) source: Retained<CardSource>,
}

impl Card {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            tags: tags::extract_hashtags(&title),
            title,
            ..Default::default()
        }
    }

    /// `metadata.progress` when it holds a number.
    pub fn progress(&self) -> Option<i64> {
        match self.metadata.get(PROGRESS_KEY) {
            Some(MetadataValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn project(&self) -> Option<String> {
        self.metadata.get(PROJECT_KEY).map(ToString::to_string)
    }

    pub fn priority(&self) -> Option<String> {
        self.metadata.get(PRIORITY_KEY).map(ToString::to_string)
    }

    /// Case- and accent-insensitive tag lookup; a leading `#` is ignored.
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = fold_tag(tag);
        self.tags.iter().any(|t| fold_tag(t) == wanted)
    }

    /// Title for rendering. Tags are only removed here, never in storage.
    pub fn display_title(&self, hide_tags: bool) -> String {
        if hide_tags {
            tags::strip_hashtags(&self.title)
        } else {
            self.title.clone()
        }
    }

    /// Decode the reminder string (`30m`, `1h`, `2d`, `1w`).
    pub fn reminder_offset(&self) -> Option<chrono::Duration> {
        let raw = self.reminder.as_deref()?.trim();
        let unit = raw.chars().last()?;
        let amount: i64 = raw[..raw.len() - unit.len_utf8()].trim().parse().ok()?;
        match unit.to_ascii_lowercase() {
            'm' => chrono::Duration::try_minutes(amount),
            'h' => chrono::Duration::try_hours(amount),
            'd' => chrono::Duration::try_days(amount),
            'w' => chrono::Duration::try_weeks(amount),
            _ => None,
        }
    }

    pub(crate) fn source(&self) -> Option<&CardSource> {
        self.source.get()
    }
}

fn fold_tag(tag: &str) -> String {
    tag.trim_start_matches('#')
        .to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct LaneSource {
    /// Raw heading line, terminator included.
    pub heading: String,
    /// Title and identifier the lane was given when parsed.
    pub title: String,
    pub id: String,
    /// The heading carried no `^id`; `id` was allocated.
    pub id_generated: bool,
    /// Raw lines between the heading and the first card.
    pub preamble: String,
    /// Raw lines after the last card up to the next section.
    pub epilogue: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: String,
    pub title: String,
    pub cards: Vec<Card>,
    #[serde(skip)]
    pub(crate) source: Retained<LaneSource>,
}

impl Lane {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Board-level configuration decoded from the settings block. Opaque to the
/// parser; keys are whatever the host stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardSettings(pub serde_json::Map<String, serde_json::Value>);

impl BoardSettings {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: serde_json::Value) -> Option<serde_json::Value> {
        self.0.insert(key.to_string(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.remove(key)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BoardLayout {
    pub crlf: bool,
    /// Raw settings block and the settings decoded from it.
    pub settings_block: Option<(String, BoardSettings)>,
    pub archive: Option<LaneSource>,
    /// Number of lanes that preceded the archive section.
    pub archive_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub lanes: Vec<Lane>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archive: Vec<Card>,
    #[serde(default)]
    pub settings: BoardSettings,
    /// Raw `---` header block including both delimiters.
    pub header: Option<String>,
    /// Text between the header block and the first section.
    #[serde(default)]
    pub header_content: String,
    /// Text after the final section's last card, before the settings block.
    #[serde(default)]
    pub pre_settings_content: String,
    #[serde(default)]
    pub footer_content: String,
    #[serde(skip)]
    pub(crate) layout: Retained<BoardLayout>,
}

impl Board {
    pub(crate) fn eol(&self) -> &'static str {
        match self.layout.get() {
            Some(layout) if layout.crlf => "\r\n",
            _ => "\n",
        }
    }
}

/// `HH:MM` encoding for times of day.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(s) => NaiveTime::parse_from_str(&s, "%H:%M")
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
