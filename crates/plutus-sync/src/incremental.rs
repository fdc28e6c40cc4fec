use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use plutus_core::CanonicalRow;

/// Keep rows whose `column` is strictly newer than the watermark. Without a
/// watermark everything passes; with one, rows lacking a timestamp are dropped.
pub fn filter_newer(
    rows: Vec<CanonicalRow>,
    watermark: Option<DateTime<Utc>>,
    column: &str,
) -> Vec<CanonicalRow> {
    let Some(watermark) = watermark else {
        return rows;
    };
    rows.into_iter()
        .filter(|row| row.timestamp(column).is_some_and(|ts| ts > watermark))
        .collect()
}

/// Partition rows by their source tag, keeping input order inside each group.
pub fn group_by_source(
    rows: Vec<CanonicalRow>,
    source_column: &str,
) -> BTreeMap<Option<String>, Vec<CanonicalRow>> {
    let mut groups: BTreeMap<Option<String>, Vec<CanonicalRow>> = BTreeMap::new();
    for row in rows {
        let key = row.text(source_column).filter(|s| !s.is_empty());
        groups.entry(key).or_default().push(row);
    }
    groups
}
