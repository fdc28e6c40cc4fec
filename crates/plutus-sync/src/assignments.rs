use chrono_tz::Tz;
use plutus_core::{parse_time, CanonicalRow, CellValue, DateOrder, RecordKind};

use crate::normalize::NormalizedRow;
use crate::summary::Validated;

/// `assign_on` is local time in `tz`. Rows whose time cannot be parsed, or falls
/// in a DST gap or fold, are dropped as invalid dates.
pub fn validate(rows: Vec<NormalizedRow>, tz: &Tz) -> Validated {
    let mut out = Validated::default();
    for row in rows {
        let Some(assign_on) = row
            .text("assign_on")
            .and_then(|text| parse_time(&text, DateOrder::MonthFirst))
            .and_then(|parsed| parsed.in_zone(tz))
        else {
            out.dropped.invalid_date += 1;
            continue;
        };

        let mut assignment = CanonicalRow::new(row.payload.clone());
        for column in RecordKind::Assignments.storage_columns() {
            let value = match column.name {
                "assign_on" => CellValue::Timestamp(assign_on),
                name => CellValue::from_scalar_text(row.get(name)),
            };
            assignment.set(column.name, value);
        }
        out.rows.push(assignment);
    }
    out
}
