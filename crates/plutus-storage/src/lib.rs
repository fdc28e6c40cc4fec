//! Storage and transport utilities for Plutus.
//!
//! The [`RecordStore`] trait is the relational seam: atomic multi-row inserts
//! guarded by a uniqueness constraint, plus a "latest value" lookup used for
//! watermarks. [`BatchWriter`] drives a store through the retry ladder.

use async_trait::async_trait;
use plutus_core::{CanonicalRow, CellValue, ColumnSpec, TableSchema};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod archive;
mod http;
mod memory;
mod pg;
mod writer;

pub use archive::RawArchive;
pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RequestAuth, RetryDisposition,
};
pub use memory::MemoryStore;
pub use pg::{map_sqlx_error, PgRecordStore};
pub use writer::{BatchWriter, WriteOutcome, DEFAULT_LADDER};

pub const CRATE_NAME: &str = "plutus-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("uniqueness constraint violated ({})", .constraint.as_deref().unwrap_or("unnamed"))]
    ConstraintViolation { constraint: Option<String> },
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

/// Equality + order + limit-1 lookup: the newest non-null `column` among rows
/// whose `filter_column` equals `filter_value`.
#[derive(Debug, Clone, Copy)]
pub struct LatestQuery<'a> {
    pub table: &'a str,
    pub column: &'a ColumnSpec,
    pub filter_column: &'a str,
    pub filter_value: &'a str,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert all rows or none. A duplicate `row_hash` fails the whole call with
    /// [`StoreError::ConstraintViolation`].
    async fn insert(&self, schema: &TableSchema, rows: &[CanonicalRow]) -> Result<usize, StoreError>;

    async fn latest(&self, query: &LatestQuery<'_>) -> Result<Option<CellValue>, StoreError>;
}

/// SHA-256 over the row's business columns in schema order. The payload is
/// excluded so upstream-only column additions do not mint new identities.
pub fn row_fingerprint(schema: &TableSchema, row: &CanonicalRow) -> String {
    let mut hasher = Sha256::new();
    for column in &schema.columns {
        hasher.update(column.name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(serde_json::to_vec(row.get(column.name)).unwrap_or_default());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plutus_core::{RawRow, RecordKind};

    fn lead(email: &str) -> CanonicalRow {
        CanonicalRow::default()
            .with("email", CellValue::text(email))
            .with("source_sheet", CellValue::text("Sheet1"))
    }

    #[test]
    fn fingerprint_ignores_payload() {
        let schema = RecordKind::Leads.schema("tofu_leads");
        let mut a = lead("a@example.com");
        let mut b = lead("a@example.com");
        a.payload = RawRow::new().with("Email", "a@example.com").to_payload();
        b.payload = RawRow::new()
            .with("Email", "a@example.com")
            .with("New Column", "x")
            .to_payload();
        assert_eq!(row_fingerprint(&schema, &a), row_fingerprint(&schema, &b));
        assert_ne!(
            row_fingerprint(&schema, &a),
            row_fingerprint(&schema, &lead("b@example.com"))
        );
    }

    #[test]
    fn absent_and_null_columns_hash_alike() {
        let schema = RecordKind::Leads.schema("tofu_leads");
        let explicit = lead("a@example.com").with("city", CellValue::Null);
        assert_eq!(
            row_fingerprint(&schema, &explicit),
            row_fingerprint(&schema, &lead("a@example.com"))
        );
    }
}
