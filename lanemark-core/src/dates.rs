/// Natural-language due dates.
///
/// A fixed English vocabulary resolved against a reference date. Phrase
/// classes are tried in priority order and the first class that matches
/// anywhere in the text wins. Weekday arithmetic uses Sunday = 0.
use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A resolved phrase and where it sits in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub matched: String,
    pub start: usize,
    pub end: usize,
}

impl ResolvedDate {
    pub fn iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

const WEEKDAY: &str = r"(sun(?:day)?|mon(?:day)?|tue(?:sday|s)?|wed(?:nesday)?|thu(?:rsday|rs|r)?|fri(?:day)?|sat(?:urday)?)";

type Resolve = fn(&Captures<'_>, NaiveDate) -> Option<NaiveDate>;

struct PhraseRule {
    pattern: Regex,
    resolve: Resolve,
}

fn rule(pattern: &str, resolve: Resolve) -> PhraseRule {
    PhraseRule {
        pattern: Regex::new(&format!(r"(?i)\b{}\b", pattern)).unwrap(),
        resolve,
    }
}

static RULES: LazyLock<Vec<PhraseRule>> = LazyLock::new(|| {
    vec![
        rule("today", |_, today| Some(today)),
        rule("tomorrow", |_, today| today.succ_opt()),
        rule("yesterday", |_, today| today.pred_opt()),
        rule(&format!(r"next\s+{}", WEEKDAY), |caps, today| {
            Some(next_weekday(today, weekday_index(caps.get(1)?.as_str())?))
        }),
        rule(&format!(r"this\s+{}", WEEKDAY), |caps, today| {
            Some(this_weekday(today, weekday_index(caps.get(1)?.as_str())?))
        }),
        rule(&format!(r"last\s+{}", WEEKDAY), |caps, today| {
            Some(last_weekday(today, weekday_index(caps.get(1)?.as_str())?))
        }),
        rule(r"in\s+(\d+)\s+days?", |caps, today| {
            today.checked_add_signed(Duration::try_days(amount(caps)?)?)
        }),
        rule(r"in\s+(\d+)\s+weeks?", |caps, today| {
            today.checked_add_signed(Duration::try_weeks(amount(caps)?)?)
        }),
        rule(r"in\s+(\d+)\s+months?", |caps, today| {
            today.checked_add_months(Months::new(u32::try_from(amount(caps)?).ok()?))
        }),
        rule(r"(\d+)\s+days?\s+ago", |caps, today| {
            today.checked_sub_signed(Duration::try_days(amount(caps)?)?)
        }),
        rule(r"next\s+week", |_, today| Some(next_weekday(today, 1))),
        rule(r"next\s+month", |_, today| {
            today.with_day(1)?.checked_add_months(Months::new(1))
        }),
        rule(r"end\s+of\s+(?:the\s+)?week", |_, today| {
            let idx = today.weekday().num_days_from_sunday() as i64;
            Some(today + Duration::days(7 - idx))
        }),
        rule(r"end\s+of\s+(?:the\s+)?month", |_, today| {
            last_day_of_month(today.year(), today.month())
        }),
    ]
});

/// First recognized phrase in `text`, resolved against `today`.
pub fn resolve_natural_date(text: &str, today: NaiveDate) -> Option<ResolvedDate> {
    RULES.iter().find_map(|rule| {
        let caps = rule.pattern.captures(text)?;
        let whole = caps.get(0)?;
        let date = (rule.resolve)(&caps, today)?;
        Some(ResolvedDate {
            date,
            matched: whole.as_str().to_string(),
            start: whole.start(),
            end: whole.end(),
        })
    })
}

fn amount(caps: &Captures<'_>) -> Option<i64> {
    caps.get(1)?.as_str().parse().ok()
}

/// Sunday = 0 index for a weekday name or three-letter abbreviation.
pub fn weekday_index(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    let index = match lowered.get(..3)? {
        "sun" => 0,
        "mon" => 1,
        "tue" => 2,
        "wed" => 3,
        "thu" => 4,
        "fri" => 5,
        "sat" => 6,
        _ => return None,
    };
    Some(index)
}

/// Strictly after `today`; a week out when today already is that weekday.
fn next_weekday(today: NaiveDate, target: u32) -> NaiveDate {
    let idx = today.weekday().num_days_from_sunday() as i64;
    let mut days = (target as i64 - idx).rem_euclid(7);
    if days == 0 {
        days = 7;
    }
    today + Duration::days(days)
}

/// The given weekday inside the current Sunday-started week.
fn this_weekday(today: NaiveDate, target: u32) -> NaiveDate {
    let idx = today.weekday().num_days_from_sunday() as i64;
    today + Duration::days(target as i64 - idx)
}

/// Strictly before `today`.
fn last_weekday(today: NaiveDate, target: u32) -> NaiveDate {
    let idx = today.weekday().num_days_from_sunday() as i64;
    let mut days = (idx - target as i64).rem_euclid(7);
    if days == 0 {
        days = 7;
    }
    today - Duration::days(days)
}

pub(crate) fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}
