use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use plutus_core::{CanonicalRow, CellValue, TableSchema};

use crate::{row_fingerprint, LatestQuery, RecordStore, StoreError};

type FailurePredicate = Box<dyn Fn(&[CanonicalRow]) -> bool + Send + Sync>;

#[derive(Default)]
struct MemoryTable {
    rows: Vec<CanonicalRow>,
    hashes: HashSet<String>,
}

/// In-process [`RecordStore`] enforcing the same `row_hash` uniqueness as the
/// Postgres tables. Used by tests and offline dry runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
    insert_calls: AtomicUsize,
    fail_when: Option<FailurePredicate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert` fail with [`StoreError::Unavailable`] whenever the predicate matches the batch.
    pub fn with_failure(mut self, predicate: impl Fn(&[CanonicalRow]) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self, table: &str) -> Vec<CanonicalRow> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).map(|t| t.rows.clone()).unwrap_or_default())
            .unwrap_or_default()
    }

    /// Preload rows without going through `insert`; duplicates are ignored.
    pub fn seed(&self, schema: &TableSchema, rows: &[CanonicalRow]) {
        if let Ok(mut tables) = self.tables.lock() {
            let table = tables.entry(schema.table.clone()).or_default();
            for row in rows {
                if table.hashes.insert(row_fingerprint(schema, row)) {
                    table.rows.push(row.clone());
                }
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, schema: &TableSchema, rows: &[CanonicalRow]) -> Result<usize, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fail) = &self.fail_when {
            if fail(rows) {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
        }

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        let table = tables.entry(schema.table.clone()).or_default();

        let mut batch = HashSet::with_capacity(rows.len());
        let mut hashes = Vec::with_capacity(rows.len());
        for row in rows {
            let hash = row_fingerprint(schema, row);
            if table.hashes.contains(&hash) || !batch.insert(hash.clone()) {
                return Err(StoreError::ConstraintViolation {
                    constraint: Some(format!("{}_row_hash_key", schema.table)),
                });
            }
            hashes.push(hash);
        }

        table.hashes.extend(hashes);
        table.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    async fn latest(&self, query: &LatestQuery<'_>) -> Result<Option<CellValue>, StoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        let Some(table) = tables.get(query.table) else {
            return Ok(None);
        };

        let newest = table
            .rows
            .iter()
            .filter(|row| row.text(query.filter_column).as_deref() == Some(query.filter_value))
            .map(|row| row.get(query.column.name))
            .filter(|value| !value.is_null())
            .max_by(|a, b| match (a.as_timestamp(), b.as_timestamp()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.as_text().cmp(&b.as_text()),
            });

        Ok(newest.cloned())
    }
}
