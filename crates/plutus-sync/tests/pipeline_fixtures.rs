use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use plutus_adapters::{HttpTabularSource, SheetsAuth};
use plutus_core::CellValue;
use plutus_storage::{HttpClientConfig, HttpFetcher, MemoryStore};
use plutus_sync::{IngestCommand, IngestConfig, IngestPipeline, RunSummary, SourceRegistry};

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap()
}

fn pipeline(store: Arc<MemoryStore>, reports: &Path) -> IngestPipeline {
    let config = IngestConfig::from_vars(BTreeMap::from([
        ("DATABASE_URL".to_string(), "postgres://unused".to_string()),
        (
            "PLUTUS_REPORTS_DIR".to_string(),
            reports.display().to_string(),
        ),
    ]))
    .expect("config");
    let registry =
        SourceRegistry::load(&fixtures_root().join("sources.fixtures.yaml")).expect("registry");
    let http = HttpFetcher::new(HttpClientConfig::default()).expect("http client");
    let source = HttpTabularSource::new(http, SheetsAuth::default());
    IngestPipeline::with_backends(config, registry, store, Arc::new(source))
}

async fn run(store: &Arc<MemoryStore>, reports: &Path, command: IngestCommand) -> RunSummary {
    pipeline(store.clone(), reports)
        .run_at(&command, false, now())
        .await
        .expect("run")
}

#[tokio::test]
async fn leads_fixture_validates_dedups_and_reingests_idempotently() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let command = || IngestCommand::Leads { sheet: None };

    let first = run(&store, tmp.path(), command()).await;
    let sheet = &first.sources[0];
    assert_eq!(sheet.error, None);
    assert_eq!(sheet.fetched, 8);
    assert_eq!(sheet.dropped.invalid_date, 2);
    assert_eq!(sheet.dropped.future_date, 1);
    assert_eq!(sheet.dropped.invalid_phone, 1);
    assert_eq!(sheet.deduplicated, 1);
    assert_eq!(sheet.inserted, 3);
    assert!(sheet.missing_columns.contains(&"ad name".to_string()));

    let stored = store.rows("tofu_leads");
    assert_eq!(stored.len(), 3);
    assert!(stored
        .iter()
        .all(|row| row.text("source_sheet").as_deref() == Some("Sheet1")));
    assert!(stored
        .iter()
        .any(|row| row.text("user_id").as_deref() == Some("919876543212")));

    let second = run(&store, tmp.path(), command()).await;
    let sheet = &second.sources[0];
    assert_eq!(sheet.new_records, 2);
    assert_eq!(sheet.inserted, 0);
    assert_eq!(sheet.skipped, 2);
    assert_eq!(store.rows("tofu_leads").len(), 3);

    let report_dir = tmp.path().join(second.run_id.to_string());
    assert!(report_dir.join("run_summary.json").exists());
    assert!(report_dir.join("summary.md").exists());
}

#[tokio::test]
async fn webinar_fixture_aggregates_sessions() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let summary = run(&store, tmp.path(), IngestCommand::Webinar).await;

    let source = &summary.sources[0];
    assert_eq!(source.error, None);
    assert_eq!(source.fetched, 5);
    assert_eq!(source.dropped.invalid_contact, 2);
    assert_eq!(source.unparsed_times, 1);
    assert_eq!(source.deduplicated, 1);
    assert_eq!(source.inserted, 2);

    let rows = store.rows("zoom_webinar_attendance");
    let asha = rows
        .iter()
        .find(|row| row.text("phone").as_deref() == Some("9876543210"))
        .expect("aggregated attendee");
    assert_eq!(asha.get("time_in_session_minutes"), &CellValue::Int(14));
    assert_eq!(
        asha.timestamp("join_time"),
        Some(Utc.with_ymd_and_hms(2025, 7, 1, 4, 30, 0).unwrap())
    );
    assert_eq!(
        asha.timestamp("leave_time"),
        Some(Utc.with_ymd_and_hms(2025, 7, 1, 4, 55, 0).unwrap())
    );
    assert_eq!(
        asha.timestamp("registration_time"),
        Some(Utc.with_ymd_and_hms(2025, 6, 28, 3, 45, 0).unwrap())
    );
    assert_eq!(asha.text("user_name").as_deref(), Some("Asha Rao"));
    assert_eq!(asha.text("email").as_deref(), Some("asha@example.com"));
    assert_eq!(asha.text("is_guest").as_deref(), Some("No"));
    assert_eq!(asha.text("source_sheet").as_deref(), Some("zoom-webinar"));
    assert_eq!(
        asha.get("webinar_date"),
        &CellValue::Date(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
    );

    let guest = rows
        .iter()
        .find(|row| row.text("email").as_deref() == Some("guest@example.com"))
        .expect("guest attendee");
    assert_eq!(guest.text("is_guest").as_deref(), Some("Yes"));
    assert_eq!(guest.text("attended").as_deref(), Some("No"));
    assert!(guest.get("user_id").is_null());
    assert!(guest.get("join_time").is_null());
}

#[tokio::test]
async fn assignments_fixture_scopes_watermarks_per_source() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());

    let first = run(&store, tmp.path(), IngestCommand::Assignments).await;
    let source = &first.sources[0];
    assert_eq!(source.fetched, 6);
    assert_eq!(source.dropped.invalid_date, 1);
    assert_eq!(source.deduplicated, 1);
    assert_eq!(source.inserted, 4);
    assert_eq!(source.unexpected_columns, vec!["team".to_string()]);

    let stored = store.rows("mofu_lead_assignments");
    let first_website = stored
        .iter()
        .find(|row| row.text("lead_mobile").as_deref() == Some("9876543210"))
        .expect("assignment");
    assert_eq!(
        first_website.timestamp("assign_on"),
        Some(Utc.with_ymd_and_hms(2025, 7, 1, 4, 30, 0).unwrap())
    );
    assert!(stored.iter().any(|row| row.get("sources").is_null()));

    let second = run(&store, tmp.path(), IngestCommand::Assignments).await;
    assert_eq!(second.sources[0].inserted, 0);
    assert_eq!(second.sources[0].skipped, 4);
    assert_eq!(store.rows("mofu_lead_assignments").len(), 4);
}

#[tokio::test]
async fn transactions_fixture_keeps_every_row() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let summary = run(&store, tmp.path(), IngestCommand::Transactions).await;

    let source = &summary.sources[0];
    assert_eq!(source.fetched, 3);
    assert_eq!(source.dropped.total(), 0);
    assert_eq!(source.deduplicated, 1);
    assert_eq!(source.inserted, 2);
    assert_eq!(source.missing_columns.len(), 37);
    assert_eq!(source.unexpected_columns, vec!["newField".to_string()]);

    let rows = store.rows("bofu_transactions");
    let t1 = rows
        .iter()
        .find(|row| row.text("mongo_id").as_deref() == Some("t1"))
        .expect("t1");
    assert!(t1.get("paid_amount").is_null());
    assert_eq!(t1.get("total_amount"), &CellValue::Float(1000.0));
    assert_eq!(t1.get("total_emis"), &CellValue::Int(3));
    assert_eq!(
        t1.payload.get("paidAmount"),
        Some(&plutus_core::ScalarValue::Int(0))
    );
    let t2 = rows
        .iter()
        .find(|row| row.text("mongo_id").as_deref() == Some("t2"))
        .expect("t2");
    assert!(t2.get("total_amount").is_null());
    assert_eq!(t2.get("paid_amount"), &CellValue::Float(200.5));
}
