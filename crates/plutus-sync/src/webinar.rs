//! Webinar attendance cleaning and per-attendee aggregation.
//!
//! Zoom exports one row per join/leave session. Rows are cleaned individually,
//! then collapsed to one row per `(webinar_date, phone else email)`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use plutus_core::{
    generate_user_id, normalize_phone, parse_time, CanonicalRow, CellValue, DateOrder, Payload,
};

use crate::normalize::NormalizedRow;
use crate::summary::{DropCounts, Validated};

const BLANK_MARKER: &str = "--";
const TRUE_TOKENS: &[&str] = &["yes", "true", "1", "y"];
const FALSE_TOKENS: &[&str] = &["no", "false", "0", "n"];

/// Descriptive columns resolved by first non-blank value within a group.
const FIRST_NON_BLANK: &[&str] = &[
    "mon",
    "category",
    "user_name",
    "first_name",
    "last_name",
    "email",
    "phone",
    "approval_status",
    "country_region_name",
    "source",
];

/// One cleaned attendance session.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRow {
    pub webinar_date: NaiveDate,
    pub phone: String,
    pub email: String,
    pub text: HashMap<&'static str, String>,
    pub attended: bool,
    pub is_guest: bool,
    /// `"Yes"`, `"No"` or empty when the flag was missing or unrecognized.
    pub is_guest_label: &'static str,
    pub join_time: Option<DateTime<Utc>>,
    pub leave_time: Option<DateTime<Utc>>,
    pub registration_time: Option<DateTime<Utc>>,
    pub minutes: i64,
    pub payload: Payload,
}

impl AttendanceRow {
    fn identity(&self) -> (NaiveDate, String) {
        let contact = if self.phone.is_empty() {
            &self.email
        } else {
            &self.phone
        };
        (self.webinar_date, contact.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanedAttendance {
    pub rows: Vec<AttendanceRow>,
    pub dropped: DropCounts,
    pub unparsed_times: usize,
}

pub fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalize the first letter of each word and lower-case the rest.
pub fn proper_case(text: &str) -> String {
    normalize_space(text)
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_bool(value: &str) -> (bool, &'static str) {
    let token = value.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        (true, "Yes")
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        (false, "No")
    } else {
        (false, "")
    }
}

fn clean_text(row: &NormalizedRow, column: &str) -> String {
    let text = normalize_space(&row.get(column).to_text().unwrap_or_default());
    if text == BLANK_MARKER {
        String::new()
    } else {
        text
    }
}

fn parse_minutes(text: &str) -> i64 {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .unwrap_or(0)
}

fn parse_local(text: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    parse_time(text, DateOrder::DayFirst).and_then(|parsed| parsed.in_zone(tz))
}

pub fn clean(rows: Vec<NormalizedRow>, tz: &Tz) -> CleanedAttendance {
    let mut out = CleanedAttendance::default();

    for row in rows {
        let mut text: HashMap<&'static str, String> = HashMap::new();
        for column in FIRST_NON_BLANK {
            let value = clean_text(&row, column);
            let value = match *column {
                "user_name" | "first_name" | "last_name" | "country_region_name" => proper_case(&value),
                "email" => value.to_lowercase(),
                "phone" => normalize_phone(&value).unwrap_or_default(),
                _ => value,
            };
            text.insert(*column, value);
        }

        let mut times = [None; 3];
        for (slot, column) in ["join_time", "leave_time", "registration_time"].iter().enumerate() {
            let raw = clean_text(&row, column);
            if raw.is_empty() {
                continue;
            }
            times[slot] = parse_local(&raw, tz);
            if times[slot].is_none() {
                out.unparsed_times += 1;
            }
        }

        let (attended, _) = normalize_bool(&clean_text(&row, "attended"));
        let (is_guest, is_guest_label) = normalize_bool(&clean_text(&row, "is_guest"));
        let minutes = parse_minutes(&clean_text(&row, "time_in_session_minutes"));
        let webinar_date = parse_time(&clean_text(&row, "webinar_date"), DateOrder::DayFirst)
            .and_then(|parsed| parsed.in_zone(tz))
            .map(|utc| utc.with_timezone(tz).date_naive());

        let phone = text.get("phone").cloned().unwrap_or_default();
        let email = text.get("email").cloned().unwrap_or_default();
        let Some(webinar_date) = webinar_date.filter(|_| !phone.is_empty() || !email.is_empty()) else {
            out.dropped.invalid_contact += 1;
            continue;
        };

        out.rows.push(AttendanceRow {
            webinar_date,
            phone,
            email,
            text,
            attended,
            is_guest,
            is_guest_label,
            join_time: times[0],
            leave_time: times[1],
            registration_time: times[2],
            minutes,
            payload: row.payload,
        });
    }
    out
}

/// Collapse sessions to one row per attendee per webinar date, in order of first appearance.
pub fn aggregate(rows: Vec<AttendanceRow>, source_sheet: &str) -> Vec<CanonicalRow> {
    let mut order: Vec<(NaiveDate, String)> = Vec::new();
    let mut groups: HashMap<(NaiveDate, String), Vec<AttendanceRow>> = HashMap::new();
    for row in rows {
        let key = row.identity();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .filter_map(|group| merge_group(&group, source_sheet))
        .collect()
}

fn merge_group(group: &[AttendanceRow], source_sheet: &str) -> Option<CanonicalRow> {
    let first = group.first()?;
    let mut merged = CanonicalRow::new(first.payload.clone());

    merged.set("webinar_date", CellValue::Date(first.webinar_date));
    for column in FIRST_NON_BLANK {
        let value = group
            .iter()
            .filter_map(|row| row.text.get(column))
            .find(|value| !value.is_empty())
            .map(String::as_str)
            .unwrap_or_default();
        merged.set(*column, CellValue::non_empty_text(value));
    }

    let minutes: i64 = group.iter().map(|row| row.minutes).sum();
    merged.set("time_in_session_minutes", CellValue::Int(minutes));
    let timestamp = |t: Option<DateTime<Utc>>| t.map(CellValue::Timestamp).unwrap_or_default();
    merged.set("join_time", timestamp(group.iter().filter_map(|r| r.join_time).min()));
    merged.set("leave_time", timestamp(group.iter().filter_map(|r| r.leave_time).max()));
    merged.set(
        "registration_time",
        timestamp(group.iter().filter_map(|r| r.registration_time).min()),
    );

    let attended = if group.iter().any(|r| r.attended) { "Yes" } else { "No" };
    merged.set("attended", CellValue::text(attended));
    merged.set("is_guest", guest_label(group));

    let user_id = merged
        .text("phone")
        .and_then(|phone| generate_user_id(&phone))
        .map(CellValue::Text)
        .unwrap_or_default();
    merged.set("user_id", user_id);
    merged.set("source_sheet", CellValue::text(source_sheet));
    Some(merged)
}

/// Any guest makes the attendee a guest; only unanimous explicit "No" yields "No".
fn guest_label(group: &[AttendanceRow]) -> CellValue {
    if group.iter().any(|r| r.is_guest) {
        CellValue::text("Yes")
    } else if group.iter().all(|r| r.is_guest_label == "No") {
        CellValue::text("No")
    } else {
        CellValue::Null
    }
}

/// Clean, then aggregate. `deduplicated` in the caller is the row count lost to merging.
pub fn validate(rows: Vec<NormalizedRow>, source_sheet: &str, tz: &Tz) -> (Validated, usize) {
    let cleaned = clean(rows, tz);
    let sessions = cleaned.rows.len();
    let rows = aggregate(cleaned.rows, source_sheet);
    let merged = sessions - rows.len();
    (
        Validated {
            rows,
            dropped: cleaned.dropped,
            unparsed_times: cleaned.unparsed_times,
        },
        merged,
    )
}
