/// Recurrence phrases ("daily", "every 2 weeks", "every monday, friday")
/// and next-occurrence arithmetic.
///
/// A parsed pattern keeps the phrase it came from. Writing a pattern back
/// prefers that phrase; a canonical one is derived only for patterns built
/// in code.
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::dates::{last_day_of_month, weekday_index};
use crate::extract::{cut, Extraction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecurrenceEnd {
    Until(NaiveDate),
    Count(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Sorted Sunday-first, no duplicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<Vec<Weekday>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<RecurrenceEnd>,
    /// Phrase as it appeared in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    /// Written as `[recur::phrase]` rather than a bare phrase.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bracketed: bool,
}

const WEEKDAY: &str = r"(?:sun(?:day)?|mon(?:day)?|tue(?:sday|s)?|wed(?:nesday)?|thu(?:rsday|rs|r)?|fri(?:day)?|sat(?:urday)?)";
const DAY_OF_MONTH: &str = r"(?:\s+on\s+the\s+(?P<dom>\d{1,2})(?:st|nd|rd|th)?\b)?";
const END: &str =
    r"(?:\s+(?:until\s+(?P<until>\d{4}-\d{2}-\d{2})|for\s+(?P<count>\d+)\s+times)\b)?";

const WORKWEEK: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];
const WEEKEND: [Weekday; 2] = [Weekday::Sun, Weekday::Sat];

type Build = fn(&Captures<'_>) -> Option<RecurrencePattern>;

struct PhraseRule {
    pattern: Regex,
    build: Build,
}

fn rule(body: &str, suffix: &str, build: Build) -> PhraseRule {
    PhraseRule {
        pattern: Regex::new(&format!(r"(?i)\b(?:{})\b{}{}", body, suffix, END)).unwrap(),
        build,
    }
}

static WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b{}\b", WEEKDAY)).unwrap());

static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[recur::([^\]\n]+)\]").unwrap());

static RULES: LazyLock<Vec<PhraseRule>> = LazyLock::new(|| {
    vec![
        rule(r"daily|every\s+day", "", |_| Some(RecurrencePattern::new(Frequency::Daily))),
        rule(r"weekly|every\s+week", "", |_| Some(RecurrencePattern::new(Frequency::Weekly))),
        rule(r"monthly|every\s+month", DAY_OF_MONTH, |caps| {
            let mut rule = RecurrencePattern::new(Frequency::Monthly);
            rule.day_of_month = day_of_month(caps)?;
            Some(rule)
        }),
        rule(r"yearly|annually|every\s+year", "", |_| {
            Some(RecurrencePattern::new(Frequency::Yearly))
        }),
        rule(
            r"every\s+(?P<n>\d+)\s+(?P<unit>days?|weeks?|years?)",
            "",
            |caps| {
                let unit = caps.name("unit")?.as_str().to_ascii_lowercase();
                let frequency = match unit.trim_end_matches('s') {
                    "day" => Frequency::Daily,
                    "week" => Frequency::Weekly,
                    _ => Frequency::Yearly,
                };
                let mut rule = RecurrencePattern::new(frequency);
                rule.interval = Some(interval(caps)?);
                Some(rule)
            },
        ),
        rule(r"every\s+(?P<n>\d+)\s+months?", DAY_OF_MONTH, |caps| {
            let mut rule = RecurrencePattern::new(Frequency::Monthly);
            rule.interval = Some(interval(caps)?);
            rule.day_of_month = day_of_month(caps)?;
            Some(rule)
        }),
        rule(
            &format!(r"every\s+(?P<days>{w}(?:\s*(?:,|&|\band\b)\s*{w})*)", w = WEEKDAY),
            "",
            |caps| {
                let days = caps.name("days")?.as_str();
                let mut set: Vec<Weekday> = WEEKDAY_RE
                    .find_iter(days)
                    .filter_map(|m| weekday_index(m.as_str()))
                    .filter_map(weekday_from_sunday_index)
                    .collect();
                normalize_weekdays(&mut set);
                let mut rule = RecurrencePattern::new(Frequency::Weekly);
                rule.weekdays = Some(set);
                Some(rule)
            },
        ),
        rule(r"every\s+weekday|weekdays", "", |_| {
            let mut rule = RecurrencePattern::new(Frequency::Weekly);
            rule.weekdays = Some(WORKWEEK.to_vec());
            Some(rule)
        }),
        rule(r"every\s+weekend|weekends", "", |_| {
            let mut rule = RecurrencePattern::new(Frequency::Weekly);
            rule.weekdays = Some(WEEKEND.to_vec());
            Some(rule)
        }),
    ]
});

/// Positive repeat count from the `n` group.
fn interval(caps: &Captures<'_>) -> Option<u32> {
    let n: u32 = caps.name("n")?.as_str().parse().ok()?;
    (n > 0).then_some(n)
}

/// `Some(None)` when no day was given, `None` (no match) when out of range.
fn day_of_month(caps: &Captures<'_>) -> Option<Option<u32>> {
    match caps.name("dom") {
        None => Some(None),
        Some(m) => {
            let day: u32 = m.as_str().parse().ok()?;
            (1..=31).contains(&day).then_some(Some(day))
        }
    }
}

fn weekday_from_sunday_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn normalize_weekdays(days: &mut Vec<Weekday>) {
    days.sort_by_key(|d| d.num_days_from_sunday());
    days.dedup();
}

fn end_condition(caps: &Captures<'_>) -> Option<Option<RecurrenceEnd>> {
    if let Some(until) = caps.name("until") {
        let date = NaiveDate::parse_from_str(until.as_str(), "%Y-%m-%d").ok()?;
        return Some(Some(RecurrenceEnd::Until(date)));
    }
    if let Some(count) = caps.name("count") {
        let n: u32 = count.as_str().parse().ok()?;
        return Some(Some(RecurrenceEnd::Count(n)));
    }
    Some(None)
}

struct PhraseMatch {
    pattern: RecurrencePattern,
    start: usize,
    end: usize,
}

fn find_phrase(text: &str) -> Option<PhraseMatch> {
    // Phrases inside `[recur::...]` belong to the bracketed form.
    let brackets: Vec<(usize, usize)> = BRACKETED_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let bracketed = |start: usize, end: usize| brackets.iter().any(|&(s, e)| start < e && end > s);

    RULES.iter().find_map(|rule| {
        rule.pattern.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            if bracketed(whole.start(), whole.end()) {
                return None;
            }
            let mut pattern = (rule.build)(&caps)?;
            pattern.end = end_condition(&caps)?;
            pattern.original = Some(whole.as_str().to_string());
            Some(PhraseMatch {
                pattern,
                start: whole.start(),
                end: whole.end(),
            })
        })
    })
}

/// Parse a standalone phrase such as `"every 2 weeks"`.
pub fn parse_recurrence(phrase: &str) -> Option<RecurrencePattern> {
    find_phrase(phrase).map(|m| m.pattern)
}

/// Recurrence stage of the card-line pipeline: bare phrases first, then
/// `[recur::phrase]`.
pub fn extract_recurrence(text: &str) -> Option<Extraction<RecurrencePattern>> {
    if let Some(found) = find_phrase(text) {
        return Some(Extraction {
            matched: text[found.start..found.end].to_string(),
            rest: cut(text, found.start, found.end),
            value: found.pattern,
        });
    }

    BRACKETED_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let inner = caps.get(1)?.as_str().trim();
        let mut pattern = find_phrase(inner)?.pattern;
        pattern.original = Some(inner.to_string());
        pattern.bracketed = true;
        Some(Extraction {
            value: pattern,
            matched: whole.as_str().to_string(),
            rest: cut(text, whole.start(), whole.end()),
        })
    })
}

impl RecurrencePattern {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: None,
            weekdays: None,
            day_of_month: None,
            end: None,
            original: None,
            bracketed: false,
        }
    }

    fn step(&self) -> u32 {
        self.interval.unwrap_or(1).max(1)
    }

    /// The phrase to write: the original one when present.
    pub fn to_phrase(&self) -> String {
        match &self.original {
            Some(original) => original.clone(),
            None => self.canonical_phrase(),
        }
    }

    /// Phrase plus bracket syntax, as it goes into a card line.
    pub fn to_token(&self) -> String {
        if self.bracketed {
            format!("[recur::{}]", self.to_phrase())
        } else {
            self.to_phrase()
        }
    }

    /// Phrase derived from the structured fields alone.
    pub fn canonical_phrase(&self) -> String {
        let mut phrase = match self.weekdays.as_deref() {
            Some(days) if !days.is_empty() => {
                let mut days = days.to_vec();
                normalize_weekdays(&mut days);
                if days == WORKWEEK {
                    "weekdays".to_string()
                } else if days == WEEKEND {
                    "weekends".to_string()
                } else {
                    let names: Vec<&str> = days.iter().map(|d| weekday_name(*d)).collect();
                    format!("every {}", names.join(", "))
                }
            }
            _ => {
                let n = self.step();
                let (single, unit) = match self.frequency {
                    Frequency::Daily => ("daily", "days"),
                    Frequency::Weekly => ("weekly", "weeks"),
                    Frequency::Monthly => ("monthly", "months"),
                    Frequency::Yearly => ("yearly", "years"),
                };
                if n == 1 {
                    single.to_string()
                } else {
                    format!("every {} {}", n, unit)
                }
            }
        };

        if self.frequency == Frequency::Monthly {
            if let Some(day) = self.day_of_month {
                phrase.push_str(&format!(" on the {}{}", day, ordinal_suffix(day)));
            }
        }

        match self.end {
            Some(RecurrenceEnd::Until(date)) => {
                phrase.push_str(&format!(" until {}", date.format("%Y-%m-%d")))
            }
            Some(RecurrenceEnd::Count(n)) => phrase.push_str(&format!(" for {} times", n)),
            None => {}
        }
        phrase
    }

    /// Next date strictly after `from`, or `None` past an `until` date.
    pub fn next_occurrence(&self, from: NaiveDate) -> Option<NaiveDate> {
        let n = self.step();
        let next = match self.frequency {
            Frequency::Daily => from.checked_add_signed(Duration::try_days(n as i64)?)?,
            Frequency::Weekly => match self.weekdays.as_deref() {
                Some(days) if !days.is_empty() => next_listed_weekday(from, days, n)?,
                _ => from.checked_add_signed(Duration::try_weeks(n as i64)?)?,
            },
            Frequency::Monthly => {
                let shifted = from.checked_add_months(Months::new(n))?;
                match self.day_of_month {
                    Some(day) => {
                        let last = last_day_of_month(shifted.year(), shifted.month())?;
                        shifted.with_day(day.min(last.day()))?
                    }
                    None => shifted,
                }
            }
            Frequency::Yearly => from.checked_add_months(Months::new(n.checked_mul(12)?))?,
        };

        match self.end {
            Some(RecurrenceEnd::Until(until)) if next > until => None,
            _ => Some(next),
        }
    }

    /// Up to `limit` successive occurrences after `from`, honoring the end
    /// condition.
    pub fn occurrences(&self, from: NaiveDate, limit: usize) -> Vec<NaiveDate> {
        let limit = match self.end {
            Some(RecurrenceEnd::Count(n)) => limit.min(n as usize),
            _ => limit,
        };
        let mut dates = Vec::with_capacity(limit);
        let mut cursor = from;
        while dates.len() < limit {
            match self.next_occurrence(cursor) {
                Some(next) => {
                    dates.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        dates
    }
}

fn next_listed_weekday(from: NaiveDate, days: &[Weekday], interval: u32) -> Option<NaiveDate> {
    let today = from.weekday().num_days_from_sunday();
    let mut indices: Vec<u32> = days.iter().map(|d| d.num_days_from_sunday()).collect();
    indices.sort_unstable();

    if let Some(later) = indices.iter().find(|&&i| i > today) {
        return from.checked_add_signed(Duration::days((later - today) as i64));
    }
    // Wrap into the following week (or `interval` weeks on).
    let first = *indices.first()?;
    let days_ahead = (7 - today + first) as i64 + 7 * (interval as i64 - 1);
    from.checked_add_signed(Duration::days(days_ahead))
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "sunday",
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_every_two_weeks_keeps_phrase() {
        let rule = parse_recurrence("every 2 weeks").unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.interval, Some(2));
        assert_eq!(rule.original.as_deref(), Some("every 2 weeks"));
        assert_eq!(rule.to_phrase(), "every 2 weeks");
    }

    #[test]
    fn test_original_phrase_wins_over_canonical() {
        let rule = parse_recurrence("Every Day").unwrap();
        assert_eq!(rule.frequency, Frequency::Daily);
        assert_eq!(rule.to_phrase(), "Every Day");
        assert_eq!(rule.canonical_phrase(), "daily");
    }

    #[test]
    fn test_simple_frequencies() {
        assert_eq!(parse_recurrence("weekly").unwrap().frequency, Frequency::Weekly);
        assert_eq!(parse_recurrence("every month").unwrap().frequency, Frequency::Monthly);
        assert_eq!(parse_recurrence("annually").unwrap().frequency, Frequency::Yearly);
        assert!(parse_recurrence("every 0 days").is_none());
        assert!(parse_recurrence("weeklyish").is_none());
    }

    #[test]
    fn test_weekday_lists() {
        let rule = parse_recurrence("every monday, wednesday").unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.weekdays, Some(vec![Weekday::Mon, Weekday::Wed]));

        let rule = parse_recurrence("every fri and mon").unwrap();
        assert_eq!(rule.weekdays, Some(vec![Weekday::Mon, Weekday::Fri]));

        let rule = parse_recurrence("weekdays").unwrap();
        assert_eq!(rule.weekdays.as_deref(), Some(&WORKWEEK[..]));

        let rule = parse_recurrence("every weekend").unwrap();
        assert_eq!(rule.weekdays.as_deref(), Some(&WEEKEND[..]));
    }

    #[test]
    fn test_canonical_phrases() {
        let mut rule = RecurrencePattern::new(Frequency::Weekly);
        rule.weekdays = Some(WORKWEEK.to_vec());
        assert_eq!(rule.to_phrase(), "weekdays");

        rule.weekdays = Some(vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(rule.to_phrase(), "weekends");

        rule.weekdays = Some(vec![Weekday::Wed, Weekday::Mon]);
        assert_eq!(rule.to_phrase(), "every monday, wednesday");

        let mut rule = RecurrencePattern::new(Frequency::Daily);
        assert_eq!(rule.to_phrase(), "daily");
        rule.interval = Some(3);
        assert_eq!(rule.to_phrase(), "every 3 days");

        let mut rule = RecurrencePattern::new(Frequency::Monthly);
        rule.day_of_month = Some(22);
        rule.end = Some(RecurrenceEnd::Count(4));
        assert_eq!(rule.to_phrase(), "monthly on the 22nd for 4 times");
    }

    #[test]
    fn test_canonical_phrase_parses_back() {
        let mut rule = RecurrencePattern::new(Frequency::Monthly);
        rule.interval = Some(2);
        rule.day_of_month = Some(1);
        rule.end = Some(RecurrenceEnd::Until(ymd(2025, 12, 31)));
        let phrase = rule.to_phrase();
        let mut back = parse_recurrence(&phrase).unwrap();
        back.original = None;
        assert_eq!(back, rule);
    }

    #[test]
    fn test_day_of_month_only_for_months() {
        let rule = parse_recurrence("every 3 months on the 15th").unwrap();
        assert_eq!(rule.frequency, Frequency::Monthly);
        assert_eq!(rule.interval, Some(3));
        assert_eq!(rule.day_of_month, Some(15));

        let hit = extract_recurrence("Review every 2 weeks on the 15th").unwrap();
        assert_eq!(hit.value.frequency, Frequency::Weekly);
        assert_eq!(hit.value.day_of_month, None);
        assert_eq!(hit.value.original.as_deref(), Some("every 2 weeks"));
        assert_eq!(hit.rest, "Review on the 15th");
    }

    #[test]
    fn test_end_conditions() {
        let rule = parse_recurrence("daily until 2025-01-20").unwrap();
        assert_eq!(rule.end, Some(RecurrenceEnd::Until(ymd(2025, 1, 20))));
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 19)), Some(ymd(2025, 1, 20)));
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 20)), None);

        let rule = parse_recurrence("weekly for 3 times").unwrap();
        assert_eq!(rule.end, Some(RecurrenceEnd::Count(3)));
        assert_eq!(
            rule.occurrences(ymd(2025, 1, 1), 10),
            vec![ymd(2025, 1, 8), ymd(2025, 1, 15), ymd(2025, 1, 22)]
        );
    }

    #[test]
    fn test_next_occurrence_daily_and_weekly() {
        let mut rule = RecurrencePattern::new(Frequency::Daily);
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 31)), Some(ymd(2025, 2, 1)));
        rule.interval = Some(3);
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 31)), Some(ymd(2025, 2, 3)));

        let mut rule = RecurrencePattern::new(Frequency::Weekly);
        rule.interval = Some(2);
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 15)), Some(ymd(2025, 1, 29)));
    }

    #[test]
    fn test_next_occurrence_weekday_set() {
        let mut rule = RecurrencePattern::new(Frequency::Weekly);
        rule.weekdays = Some(vec![Weekday::Mon, Weekday::Fri]);
        // Friday -> following Monday, not the same Friday.
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 17)), Some(ymd(2025, 1, 20)));
        // Wednesday -> Friday of the same week.
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 15)), Some(ymd(2025, 1, 17)));
        // Saturday wraps to Monday.
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 18)), Some(ymd(2025, 1, 20)));
    }

    #[test]
    fn test_next_occurrence_monthly_clamps() {
        let mut rule = RecurrencePattern::new(Frequency::Monthly);
        rule.day_of_month = Some(31);
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 31)), Some(ymd(2025, 2, 28)));
        assert_eq!(rule.next_occurrence(ymd(2025, 2, 28)), Some(ymd(2025, 3, 31)));

        let rule = parse_recurrence("every 3 months on the 15th").unwrap();
        assert_eq!(rule.day_of_month, Some(15));
        assert_eq!(rule.next_occurrence(ymd(2025, 1, 2)), Some(ymd(2025, 4, 15)));
    }

    #[test]
    fn test_next_occurrence_yearly_leap_day() {
        let rule = RecurrencePattern::new(Frequency::Yearly);
        assert_eq!(rule.next_occurrence(ymd(2024, 2, 29)), Some(ymd(2025, 2, 28)));
    }

    #[test]
    fn test_extract_bare_and_bracketed() {
        let hit = extract_recurrence("Water plants every monday, thursday").unwrap();
        assert_eq!(hit.rest, "Water plants");
        assert_eq!(hit.value.original.as_deref(), Some("every monday, thursday"));

        let hit = extract_recurrence("Backup [recur::every 2 days]").unwrap();
        assert!(hit.value.bracketed);
        assert_eq!(hit.value.to_token(), "[recur::every 2 days]");
        assert_eq!(hit.rest, "Backup");

        assert!(extract_recurrence("Backup [recur::sometimes]").is_none());
    }

    #[test]
    fn test_bracketed_vocabulary_phrase() {
        let hit = extract_recurrence("Review [recur::weekly]").unwrap();
        assert!(hit.value.bracketed);
        assert_eq!(hit.value.frequency, Frequency::Weekly);
        assert_eq!(hit.rest, "Review");
    }

    #[test]
    fn test_bare_phrase_preferred_over_bracket() {
        let hit = extract_recurrence("[recur::weekly] daily").unwrap();
        assert_eq!(hit.value.frequency, Frequency::Daily);
        assert!(!hit.value.bracketed);
    }
}
