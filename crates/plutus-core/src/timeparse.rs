//! Lenient timestamp parsing for spreadsheet and API exports.
//!
//! Numeric dates such as `03/04/2025` are read in the preferred [`DateOrder`]
//! first and fall back to the other order when that fails.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

impl DateOrder {
    fn other(self) -> Self {
        match self {
            Self::MonthFirst => Self::DayFirst,
            Self::DayFirst => Self::MonthFirst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedTime {
    /// Naive values are taken as UTC wall-clock time.
    pub fn assume_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Aware(t) => t.with_timezone(&Utc),
            Self::Naive(n) => n.and_utc(),
        }
    }

    /// Localize naive values in `tz`. Ambiguous or skipped local times yield `None`.
    pub fn in_zone(&self, tz: &Tz) -> Option<DateTime<Utc>> {
        match self {
            Self::Aware(t) => Some(t.with_timezone(&Utc)),
            Self::Naive(n) => match tz.from_local_datetime(n) {
                LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
                LocalResult::Ambiguous(..) | LocalResult::None => None,
            },
        }
    }

    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            Self::Aware(t) => t.naive_local(),
            Self::Naive(n) => *n,
        }
    }
}

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%b %d, %Y %I:%M:%S %p",
    "%b %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

const ISO_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y", "%d-%b-%Y",
];

// `{a}`/`{b}` are the first and second numeric date fields.
const NUMERIC_DATETIME_TEMPLATES: &[&str] = &[
    "{a}/{b}/%Y %H:%M:%S",
    "{a}/{b}/%Y %H:%M",
    "{a}/{b}/%Y %I:%M:%S %p",
    "{a}/{b}/%Y %I:%M %p",
];

const NUMERIC_DATE_TEMPLATE: &str = "{a}/{b}/%Y";

const SEPARATORS: &[char] = &['/', '-', '.'];

pub fn parse_time(text: &str, order: DateOrder) -> Option<ParsedTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedTime::Aware(t));
    }
    for fmt in AWARE_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(text, fmt) {
            return Some(ParsedTime::Aware(t));
        }
    }
    if let Some(n) = parse_naive(text, ISO_DATETIME_FORMATS, ISO_DATE_FORMATS) {
        return Some(ParsedTime::Naive(n));
    }

    parse_numeric(text, order)
        .or_else(|| parse_numeric(text, order.other()))
        .map(ParsedTime::Naive)
}

fn parse_numeric(text: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let (a, b) = match order {
        DateOrder::MonthFirst => ("%m", "%d"),
        DateOrder::DayFirst => ("%d", "%m"),
    };
    for sep in SEPARATORS {
        let expand = |template: &str| {
            template
                .replace('/', &sep.to_string())
                .replace("{a}", a)
                .replace("{b}", b)
        };
        let datetime: Vec<String> = NUMERIC_DATETIME_TEMPLATES.iter().map(|t| expand(t)).collect();
        let date = expand(NUMERIC_DATE_TEMPLATE);
        let datetime_refs: Vec<&str> = datetime.iter().map(String::as_str).collect();
        if let Some(n) = parse_naive(text, &datetime_refs, &[date.as_str()]) {
            return Some(n);
        }
    }
    None
}

fn parse_naive(text: &str, datetime_formats: &[&str], date_formats: &[&str]) -> Option<NaiveDateTime> {
    datetime_formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            date_formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(text: &str, order: DateOrder) -> String {
        parse_time(text, order)
            .expect("parse")
            .naive_local()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    #[test]
    fn numeric_dates_respect_preferred_order_with_fallback() {
        assert_eq!(naive("03/04/2025", DateOrder::MonthFirst), "2025-03-04 00:00:00");
        assert_eq!(naive("03/04/2025", DateOrder::DayFirst), "2025-04-03 00:00:00");
        assert_eq!(naive("25/12/2025 18:30", DateOrder::MonthFirst), "2025-12-25 18:30:00");
        assert_eq!(naive("12-25-2025 06:05:00 PM", DateOrder::DayFirst), "2025-12-25 18:05:00");
    }

    #[test]
    fn iso_and_textual_forms() {
        assert_eq!(naive("2025-07-01 10:00:00", DateOrder::MonthFirst), "2025-07-01 10:00:00");
        assert_eq!(naive("2025-07-01T10:00:00.250", DateOrder::MonthFirst), "2025-07-01 10:00:00");
        assert_eq!(naive("Jul 02, 2025 09:15:00 AM", DateOrder::DayFirst), "2025-07-02 09:15:00");
        assert_eq!(naive("2025-07-01", DateOrder::DayFirst), "2025-07-01 00:00:00");
        assert!(parse_time("not a date", DateOrder::MonthFirst).is_none());
        assert!(parse_time("   ", DateOrder::MonthFirst).is_none());
    }

    #[test]
    fn offsets_are_kept_and_converted() {
        let parsed = parse_time("2025-07-01T10:00:00+05:30", DateOrder::MonthFirst).expect("parse");
        assert!(matches!(parsed, ParsedTime::Aware(_)));
        assert_eq!(parsed.assume_utc().to_rfc3339(), "2025-07-01T04:30:00+00:00");
        let kolkata: Tz = "Asia/Kolkata".parse().expect("tz");
        assert_eq!(
            parsed.in_zone(&kolkata).map(|t| t.to_rfc3339()),
            Some("2025-07-01T04:30:00+00:00".to_string())
        );
    }

    #[test]
    fn naive_times_localize_in_zone() {
        let kolkata: Tz = "Asia/Kolkata".parse().expect("tz");
        let parsed = parse_time("2025-07-01 10:00:00", DateOrder::MonthFirst).expect("parse");
        assert_eq!(
            parsed.in_zone(&kolkata).map(|t| t.to_rfc3339()),
            Some("2025-07-01T04:30:00+00:00".to_string())
        );
    }

    #[test]
    fn skipped_and_repeated_local_times_are_rejected() {
        let ny: Tz = "America/New_York".parse().expect("tz");
        let gap = parse_time("2025-03-09 02:30:00", DateOrder::MonthFirst).expect("parse");
        assert_eq!(gap.in_zone(&ny), None);
        let fold = parse_time("2025-11-02 01:30:00", DateOrder::MonthFirst).expect("parse");
        assert_eq!(fold.in_zone(&ny), None);
    }
}
