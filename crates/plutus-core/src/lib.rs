//! Core domain model for Plutus: raw source rows, canonical rows, payloads,
//! record schemas and the identity/time normalization rules shared by every
//! ingestion pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod identity;
pub mod schema;
pub mod timeparse;

pub use identity::{generate_user_id, normalize_phone, validate_user_id};
pub use schema::{ColumnKind, ColumnMap, ColumnSpec, RecordKind, TableSchema};
pub use timeparse::{parse_time, DateOrder, ParsedTime};

pub const CRATE_NAME: &str = "plutus-core";

/// Only the float placeholder reads as null; words like "NA" or "None" stay text.
const NULL_TOKENS: &[&str] = &["nan", "NaN", "NAN"];

/// A loosely typed cell as delivered by a sheet or API export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ScalarValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Infer a scalar from exported cell text.
    ///
    /// Integers with a leading zero stay text so phone-like values keep their digits.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed) {
            return Self::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        let leading_zero = trimmed.len() > 1
            && trimmed.starts_with('0')
            && trimmed.as_bytes().get(1).is_some_and(|b| b.is_ascii_digit());
        if !leading_zero {
            if let Ok(v) = trimmed.parse::<i64>() {
                return Self::Int(v);
            }
            if looks_numeric(trimmed) {
                if let Ok(v) = trimmed.parse::<f64>() {
                    return Self::Float(v);
                }
            }
        }
        Self::Text(raw.to_string())
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            JsonValue::String(s) => Self::infer(s),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Render the value the way it reads in the sheet; `None` for nulls.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) if v.is_nan() => None,
            Self::Float(v) => Some(render_float(*v)),
            Self::Text(s) => Some(s.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Replace non-finite floats: NaN becomes null, infinities become zero.
    pub fn sanitized(self) -> Self {
        match self {
            Self::Float(v) if v.is_nan() => Self::Null,
            Self::Float(v) if v.is_infinite() => Self::Int(0),
            other => other,
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(v) => JsonValue::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

fn looks_numeric(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    let body = lower.trim_start_matches(['+', '-']);
    matches!(body, "inf" | "infinity")
        || (body.chars().any(|c| c.is_ascii_digit())
            && body
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-')))
}

fn render_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// One row exactly as fetched, in upstream column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RawRow {
    cells: Vec<(String, ScalarValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ScalarValue)>,
    {
        Self {
            cells: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Builder used by fixtures and tests; cell text goes through [`ScalarValue::infer`].
    pub fn with(mut self, column: impl Into<String>, raw: &str) -> Self {
        self.push(column, ScalarValue::infer(raw));
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: ScalarValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn cells(&self) -> &[(String, ScalarValue)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::default();
        for (column, value) in &self.cells {
            payload.insert(column.clone(), value.clone());
        }
        payload
    }
}

/// Catch-all copy of the upstream row, kept for forward compatibility with schema drift.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, ScalarValue>);

impl Payload {
    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, value: ScalarValue) {
        self.0.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.0.iter()
    }

    pub fn sanitized(self) -> Self {
        Self(self.0.into_iter().map(|(k, v)| (k, v.sanitized())).collect())
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// A typed, storage-ready value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

static NULL_CELL: CellValue = CellValue::Null;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Text cell for a scalar, null when the scalar is null.
    pub fn from_scalar_text(value: &ScalarValue) -> Self {
        value.to_text().map(Self::Text).unwrap_or(Self::Null)
    }

    /// Null for empty strings, text otherwise.
    pub fn non_empty_text(value: &str) -> Self {
        if value.is_empty() {
            Self::Null
        } else {
            Self::Text(value.to_string())
        }
    }

    /// Coerce a raw scalar into the declared column kind. Values that do not
    /// convert become null; the untouched original survives in the payload.
    pub fn coerce(kind: ColumnKind, value: &ScalarValue) -> Self {
        match kind {
            ColumnKind::Text => Self::from_scalar_text(value),
            ColumnKind::Integer => match value {
                ScalarValue::Int(v) => Self::Int(*v),
                other => other
                    .as_f64()
                    .filter(|v| v.is_finite() && v.fract() == 0.0)
                    .map(|v| Self::Int(v as i64))
                    .unwrap_or(Self::Null),
            },
            ColumnKind::Float => value
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Self::Float)
                .unwrap_or(Self::Null),
            ColumnKind::Timestamp => value
                .to_text()
                .and_then(|t| parse_time(&t, DateOrder::MonthFirst))
                .map(|p| Self::Timestamp(p.assume_utc()))
                .unwrap_or(Self::Null),
            ColumnKind::Date => value
                .to_text()
                .and_then(|t| parse_time(&t, DateOrder::MonthFirst))
                .map(|p| Self::Date(p.naive_local().date()))
                .unwrap_or(Self::Null),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(render_float(*v)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Timestamp(t) => Some(t.to_rfc3339()),
            Self::Date(d) => Some(d.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Absolute instant for timestamp-like cells; dates resolve to UTC midnight.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::Date(d) => Some(d.and_time(NaiveTime::MIN).and_utc()),
            Self::Text(s) => parse_time(s, DateOrder::MonthFirst).map(|p| p.assume_utc()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Timestamp(t) => Some(t.date_naive()),
            _ => None,
        }
    }
}

/// The cleaned, schema-conformant row written to storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CanonicalRow {
    pub fields: BTreeMap<String, CellValue>,
    pub payload: Payload,
}

impl CanonicalRow {
    pub fn new(payload: Payload) -> Self {
        Self {
            fields: BTreeMap::new(),
            payload,
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        self.fields.insert(column.into(), value);
    }

    pub fn with(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.set(column, value);
        self
    }

    /// Missing columns read as null.
    pub fn get(&self, column: &str) -> &CellValue {
        self.fields.get(column).unwrap_or(&NULL_CELL)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).as_text()
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.get(column).as_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_recognizes_blank_numbers_and_text() {
        assert_eq!(ScalarValue::infer("  "), ScalarValue::Null);
        assert_eq!(ScalarValue::infer("NaN"), ScalarValue::Null);
        assert_eq!(ScalarValue::infer("42"), ScalarValue::Int(42));
        assert_eq!(ScalarValue::infer("4.5"), ScalarValue::Float(4.5));
        assert_eq!(ScalarValue::infer("TRUE"), ScalarValue::Bool(true));
        assert_eq!(ScalarValue::infer("0987"), ScalarValue::text("0987"));
        assert_eq!(ScalarValue::infer("+91-98765-43210"), ScalarValue::text("+91-98765-43210"));
        assert!(matches!(ScalarValue::infer("inf"), ScalarValue::Float(v) if v.is_infinite()));
        assert_eq!(ScalarValue::infer("Jul 2025"), ScalarValue::text("Jul 2025"));
    }

    #[test]
    fn placeholder_words_survive_as_text() {
        for word in ["NA", "N/A", "None", "null", "#N/A"] {
            assert_eq!(ScalarValue::infer(word), ScalarValue::text(word), "{word}");
        }
        let payload = RawRow::new().with("country", "NA").to_payload().sanitized();
        assert_eq!(payload.get("country"), Some(&ScalarValue::text("NA")));
    }

    #[test]
    fn float_text_drops_integral_fraction() {
        assert_eq!(
            ScalarValue::Float(9876543210.0).to_text().as_deref(),
            Some("9876543210")
        );
        assert_eq!(ScalarValue::Float(2.5).to_text().as_deref(), Some("2.5"));
    }

    #[test]
    fn payload_sanitizes_non_finite_numbers() {
        let row = RawRow::new()
            .with("amount", "inf")
            .with("ratio", "1.5")
            .with("note", "ok");
        let mut payload = row.to_payload();
        payload.insert("missing".into(), ScalarValue::Float(f64::NAN));
        let clean = payload.sanitized();
        assert_eq!(clean.get("amount"), Some(&ScalarValue::Int(0)));
        assert_eq!(clean.get("missing"), Some(&ScalarValue::Null));
        assert_eq!(clean.get("ratio"), Some(&ScalarValue::Float(1.5)));
        assert_eq!(
            clean.to_json(),
            serde_json::json!({"amount": 0, "missing": null, "note": "ok", "ratio": 1.5})
        );
    }

    #[test]
    fn coerce_follows_column_kind() {
        assert_eq!(
            CellValue::coerce(ColumnKind::Integer, &ScalarValue::text("3.0")),
            CellValue::Int(3)
        );
        assert_eq!(
            CellValue::coerce(ColumnKind::Integer, &ScalarValue::Float(2.5)),
            CellValue::Null
        );
        assert_eq!(
            CellValue::coerce(ColumnKind::Float, &ScalarValue::text("abc")),
            CellValue::Null
        );
        assert_eq!(
            CellValue::coerce(ColumnKind::Text, &ScalarValue::Int(7)),
            CellValue::text("7")
        );
        let ts = CellValue::coerce(ColumnKind::Timestamp, &ScalarValue::text("2025-03-01 08:00:00"));
        assert_eq!(
            ts.as_timestamp().map(|t| t.to_rfc3339()),
            Some("2025-03-01T08:00:00+00:00".to_string())
        );
    }

    #[test]
    fn canonical_row_reads_missing_columns_as_null() {
        let row = CanonicalRow::default().with("email", CellValue::text("a@b.c"));
        assert_eq!(row.text("email").as_deref(), Some("a@b.c"));
        assert!(row.get("phone").is_null());
    }

    #[test]
    fn date_cells_resolve_to_utc_midnight() {
        let d = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(
            CellValue::Date(d).as_timestamp().map(|t| t.to_rfc3339()),
            Some("2025-07-01T00:00:00+00:00".to_string())
        );
    }
}
