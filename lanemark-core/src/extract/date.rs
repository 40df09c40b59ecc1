/// Due date and time tokens.
///
/// `@2025-03-10` or `@2025-03-10T14:30` wins over everything; a lone
/// `@@14:30` sets only the time; otherwise, when enabled, the first
/// natural-language phrase the resolver recognizes becomes the date.
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

use super::{cut, Extraction};
use crate::dates;

static ISO_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)@(\d{4}-\d{2}-\d{2})(?:T(\d{2}:\d{2}))?\b").unwrap()
});

static TIME_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@@(\d{2}:\d{2})\b").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

pub fn extract_due(text: &str, natural_dates: bool, today: NaiveDate) -> Option<Extraction<Due>> {
    extract_iso(text)
        .or_else(|| extract_time_only(text))
        .or_else(|| {
            if !natural_dates {
                return None;
            }
            let resolved = dates::resolve_natural_date(text, today)?;
            Some(Extraction {
                value: Due {
                    date: Some(resolved.date),
                    time: None,
                },
                rest: cut(text, resolved.start, resolved.end),
                matched: resolved.matched,
            })
        })
}

fn extract_iso(text: &str) -> Option<Extraction<Due>> {
    ISO_DATE_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()?;
        let time = match caps.get(2) {
            Some(t) => Some(NaiveTime::parse_from_str(t.as_str(), "%H:%M").ok()?),
            None => None,
        };
        Some(Extraction {
            value: Due {
                date: Some(date),
                time,
            },
            matched: whole.as_str().trim().to_string(),
            rest: cut(text, whole.start(), whole.end()),
        })
    })
}

fn extract_time_only(text: &str) -> Option<Extraction<Due>> {
    TIME_ONLY_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let time = NaiveTime::parse_from_str(caps.get(1)?.as_str(), "%H:%M").ok()?;
        Some(Extraction {
            value: Due {
                date: None,
                time: Some(time),
            },
            matched: whole.as_str().trim().to_string(),
            rest: cut(text, whole.start(), whole.end()),
        })
    })
}

/// Inverse of the extractor, for regenerated card lines.
pub fn format_due(date: Option<NaiveDate>, time: Option<NaiveTime>) -> Option<String> {
    match (date, time) {
        (Some(d), Some(t)) => Some(format!("@{}T{}", d.format("%Y-%m-%d"), t.format("%H:%M"))),
        (Some(d), None) => Some(format!("@{}", d.format("%Y-%m-%d"))),
        (None, Some(t)) => Some(format!("@@{}", t.format("%H:%M"))),
        (None, None) => None,
    }
}
