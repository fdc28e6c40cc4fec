use chrono::{DateTime, TimeDelta, Utc};
use plutus_core::TableSchema;
use plutus_storage::{LatestQuery, RecordStore, StoreError};
use tracing::{debug, warn};

/// How a stored maximum turns into an ingestion cut-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkPolicy {
    /// Re-ingest this far behind the newest stored row so late edits are picked up.
    pub rollback: TimeDelta,
    /// Stored values further ahead of `now` than this are treated as `now + future_clamp`.
    pub future_clamp: TimeDelta,
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self::with_rollback_days(3)
    }
}

impl WatermarkPolicy {
    pub fn with_rollback_days(days: i64) -> Self {
        Self {
            rollback: TimeDelta::try_days(days.max(0)).unwrap_or(TimeDelta::MAX),
            future_clamp: TimeDelta::days(1),
        }
    }

    pub fn adjust(&self, latest: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let ceiling = now.checked_add_signed(self.future_clamp).unwrap_or(now);
        latest
            .min(ceiling)
            .checked_sub_signed(self.rollback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

pub struct WatermarkReader<'a> {
    store: &'a dyn RecordStore,
    policy: WatermarkPolicy,
}

impl<'a> WatermarkReader<'a> {
    pub fn new(store: &'a dyn RecordStore, policy: WatermarkPolicy) -> Self {
        Self { store, policy }
    }

    /// Newest stored timestamp for this source, adjusted by the policy. `None`
    /// when the kind has no watermark, nothing is stored yet, or the stored value
    /// is unreadable.
    pub async fn get_watermark(
        &self,
        schema: &TableSchema,
        source_value: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let (Some(column_name), Some(filter_column)) =
            (schema.kind.watermark_column(), schema.kind.source_column())
        else {
            return Ok(None);
        };
        let Some(column) = schema.column(column_name) else {
            return Ok(None);
        };

        let query = LatestQuery {
            table: &schema.table,
            column,
            filter_column,
            filter_value: source_value,
        };
        let Some(latest) = self.store.latest(&query).await? else {
            debug!(table = %schema.table, source = source_value, "no stored rows; full load");
            return Ok(None);
        };
        let Some(latest) = latest.as_timestamp() else {
            warn!(
                table = %schema.table,
                source = source_value,
                value = ?latest,
                "stored watermark is not a timestamp; ignoring it"
            );
            return Ok(None);
        };

        let watermark = self.policy.adjust(latest, now);
        debug!(
            table = %schema.table,
            source = source_value,
            latest = %latest,
            watermark = %watermark,
            "watermark resolved"
        );
        Ok(Some(watermark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use plutus_core::{CanonicalRow, CellValue, RecordKind};
    use plutus_storage::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn adjust_rolls_back_and_clamps_the_future() {
        let policy = WatermarkPolicy::default();
        let past = Utc.with_ymd_and_hms(2025, 7, 8, 0, 0, 0).unwrap();
        assert_eq!(policy.adjust(past, now()), past - TimeDelta::days(3));

        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            policy.adjust(far_future, now()),
            now() + TimeDelta::days(1) - TimeDelta::days(3)
        );
    }

    #[test]
    fn huge_rollback_saturates_instead_of_overflowing() {
        let policy = WatermarkPolicy::with_rollback_days(100_000_000);
        assert_eq!(policy.adjust(now(), now()), DateTime::<Utc>::MIN_UTC);

        let policy = WatermarkPolicy::with_rollback_days(i64::MAX);
        assert_eq!(policy.rollback, TimeDelta::MAX);
        assert_eq!(policy.adjust(now(), now()), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn adjust_is_monotonic_in_the_stored_value() {
        let policy = WatermarkPolicy::with_rollback_days(1);
        let mut previous = None;
        for day in 1..=20 {
            let latest = Utc.with_ymd_and_hms(2025, 7, day, 0, 0, 0).unwrap();
            let adjusted = policy.adjust(latest, now());
            if let Some(prev) = previous {
                assert!(adjusted >= prev);
            }
            previous = Some(adjusted);
        }
    }

    #[tokio::test]
    async fn reads_latest_per_source() {
        let store = MemoryStore::new();
        let schema = RecordKind::Leads.schema("tofu_leads");
        let row = |sheet: &str, day: u32| {
            CanonicalRow::default()
                .with("source_sheet", CellValue::text(sheet))
                .with(
                    "created_date",
                    CellValue::Timestamp(Utc.with_ymd_and_hms(2025, 7, day, 0, 0, 0).unwrap()),
                )
                .with("user_id", CellValue::text(format!("91987654321{day}")))
        };
        store.seed(&schema, &[row("Sheet1", 5), row("Sheet1", 7), row("ACCA", 9)]);

        let reader = WatermarkReader::new(&store, WatermarkPolicy::default());
        let sheet1 = reader.get_watermark(&schema, "Sheet1", now()).await.expect("read");
        assert_eq!(sheet1, Some(Utc.with_ymd_and_hms(2025, 7, 4, 0, 0, 0).unwrap()));
        let empty = reader.get_watermark(&schema, "Other", now()).await.expect("read");
        assert_eq!(empty, None);
    }

    #[tokio::test]
    async fn date_watermarks_resolve_to_midnight() {
        let store = MemoryStore::new();
        let schema = RecordKind::Webinar.schema("zoom_webinar_attendance");
        let date = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        store.seed(
            &schema,
            &[CanonicalRow::default()
                .with("source_sheet", CellValue::text("zoom"))
                .with("webinar_date", CellValue::Date(date))],
        );
        let reader = WatermarkReader::new(&store, WatermarkPolicy::with_rollback_days(0));
        let mark = reader.get_watermark(&schema, "zoom", now()).await.expect("read");
        assert_eq!(mark, Some(Utc.with_ymd_and_hms(2025, 7, 8, 0, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn transactions_have_no_watermark() {
        let store = MemoryStore::new();
        let schema = RecordKind::Transactions.schema("bofu_transactions");
        let reader = WatermarkReader::new(&store, WatermarkPolicy::default());
        assert_eq!(reader.get_watermark(&schema, "x", now()).await.expect("read"), None);
    }
}
