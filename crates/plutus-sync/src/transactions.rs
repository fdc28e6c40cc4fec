use plutus_core::{CanonicalRow, CellValue, RecordKind};

use crate::normalize::NormalizedRow;
use crate::summary::Validated;

/// Transactions are never dropped. Each business column is coerced to its
/// declared kind; non-finite payload numbers are made JSON-safe.
pub fn validate(rows: Vec<NormalizedRow>) -> Validated {
    let columns = RecordKind::Transactions.storage_columns();
    let rows = rows
        .into_iter()
        .map(|row| {
            let mut txn = CanonicalRow::new(row.payload.clone().sanitized());
            for column in columns {
                txn.set(column.name, CellValue::coerce(column.kind, row.get(column.name)));
            }
            txn
        })
        .collect();
    Validated {
        rows,
        ..Validated::default()
    }
}
