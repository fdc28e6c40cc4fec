use std::collections::HashSet;

use plutus_core::{CanonicalRow, TableSchema};
use plutus_storage::row_fingerprint;

/// Drop rows identical across every schema column. The first occurrence wins and
/// input order is kept. Returns the survivors and the number removed.
pub fn dedup_exact(schema: &TableSchema, rows: Vec<CanonicalRow>) -> (Vec<CanonicalRow>, usize) {
    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<CanonicalRow> = rows
        .into_iter()
        .filter(|row| seen.insert(row_fingerprint(schema, row)))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
