use chrono::{DateTime, TimeDelta, Utc};
use plutus_core::{generate_user_id, parse_time, CanonicalRow, CellValue, DateOrder, RecordKind};
use tracing::debug;

use crate::normalize::NormalizedRow;
use crate::summary::Validated;

/// Leads dated more than this many days ahead of the run are rejected.
pub const FUTURE_TOLERANCE_DAYS: i64 = 1;

pub fn validate(rows: Vec<NormalizedRow>, sheet_name: &str, now: DateTime<Utc>) -> Validated {
    let mut out = Validated::default();
    let latest_allowed = now + TimeDelta::days(FUTURE_TOLERANCE_DAYS);

    for row in rows {
        let Some(created) = row
            .text("created_date")
            .and_then(|text| parse_time(&text, DateOrder::MonthFirst))
            .map(|parsed| parsed.assume_utc())
        else {
            out.dropped.invalid_date += 1;
            continue;
        };
        if created > latest_allowed {
            out.dropped.future_date += 1;
            continue;
        }
        let Some(user_id) = row.text("phone_number").and_then(|phone| generate_user_id(&phone)) else {
            out.dropped.invalid_phone += 1;
            continue;
        };

        let mut lead = CanonicalRow::new(row.payload.clone());
        for column in RecordKind::Leads.storage_columns() {
            let value = match column.name {
                "created_date" => CellValue::Timestamp(created),
                "user_id" => CellValue::Text(user_id.clone()),
                "source_sheet" => CellValue::text(sheet_name),
                name => CellValue::from_scalar_text(row.get(name)),
            };
            lead.set(column.name, value);
        }
        out.rows.push(lead);
    }

    debug!(
        sheet = sheet_name,
        kept = out.rows.len(),
        invalid_date = out.dropped.invalid_date,
        future_date = out.dropped.future_date,
        invalid_phone = out.dropped.invalid_phone,
        "leads validated"
    );
    out
}
