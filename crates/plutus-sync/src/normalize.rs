use std::collections::BTreeMap;

use plutus_core::{ColumnMap, Payload, RawRow, ScalarValue};
use tracing::warn;

static NULL_SCALAR: ScalarValue = ScalarValue::Null;

/// A row renamed to storage columns, with the full upstream row kept in `payload`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedRow {
    pub values: BTreeMap<&'static str, ScalarValue>,
    pub payload: Payload,
}

impl NormalizedRow {
    pub fn get(&self, column: &str) -> &ScalarValue {
        self.values.get(column).unwrap_or(&NULL_SCALAR)
    }

    /// Cell text with surrounding whitespace removed; `None` for null or blank cells.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column)
            .to_text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedBatch {
    pub rows: Vec<NormalizedRow>,
    /// Upstream headers expected by the column map but absent from the fetch.
    pub missing_columns: Vec<String>,
    /// Upstream headers the column map does not know; kept only in payloads.
    pub unexpected_columns: Vec<String>,
}

pub fn normalize(raw: &[RawRow], map: ColumnMap) -> NormalizedBatch {
    if raw.is_empty() {
        return NormalizedBatch::default();
    }

    let mut headers: Vec<String> = Vec::new();
    for row in raw {
        for column in row.columns() {
            let column = column.trim();
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
    }

    let storage_columns = map.storage_columns();
    let missing_columns: Vec<String> = storage_columns
        .iter()
        .filter_map(|storage| {
            let aliases = map.upstream_for(storage);
            if aliases.iter().any(|a| headers.iter().any(|h| h == a)) {
                None
            } else {
                aliases.first().map(|a| a.to_string())
            }
        })
        .collect();
    let mut unexpected_columns: Vec<String> = headers
        .iter()
        .filter(|h| map.storage_for(h).is_none())
        .cloned()
        .collect();
    unexpected_columns.sort();

    if !missing_columns.is_empty() {
        warn!(columns = ?missing_columns, "upstream is missing expected columns; filling with nulls");
    }
    if !unexpected_columns.is_empty() {
        warn!(columns = ?unexpected_columns, "upstream returned new columns; storing them only in payload");
    }

    let rows = raw
        .iter()
        .map(|row| {
            let trimmed = RawRow::from_pairs(
                row.cells()
                    .iter()
                    .map(|(column, value)| (column.trim().to_string(), value.clone())),
            );
            let mut values = BTreeMap::new();
            for storage in &storage_columns {
                let value = map
                    .upstream_for(storage)
                    .iter()
                    .find_map(|alias| trimmed.get(alias))
                    .cloned()
                    .unwrap_or_default();
                values.insert(*storage, value);
            }
            NormalizedRow {
                values,
                payload: trimmed.to_payload(),
            }
        })
        .collect();

    NormalizedBatch {
        rows,
        missing_columns,
        unexpected_columns,
    }
}
