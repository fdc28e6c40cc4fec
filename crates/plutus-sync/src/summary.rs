use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use plutus_core::{CanonicalRow, RecordKind};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub invalid_date: usize,
    pub future_date: usize,
    pub invalid_phone: usize,
    pub invalid_contact: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.invalid_date + self.future_date + self.invalid_phone + self.invalid_contact
    }

    fn absorb(&mut self, other: &DropCounts) {
        self.invalid_date += other.invalid_date;
        self.future_date += other.future_date;
        self.invalid_phone += other.invalid_phone;
        self.invalid_contact += other.invalid_contact;
    }
}

/// Output of a validator: the surviving rows plus what was dropped and why.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub rows: Vec<CanonicalRow>,
    pub dropped: DropCounts,
    pub unparsed_times: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub kind: Option<RecordKind>,
    pub fetched: usize,
    pub dropped: DropCounts,
    pub unparsed_times: usize,
    pub deduplicated: usize,
    pub new_records: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub missing_columns: Vec<String>,
    pub unexpected_columns: Vec<String>,
    pub error: Option<String>,
}

impl SourceSummary {
    pub fn new(kind: RecordKind, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: Some(kind),
            fetched: 0,
            dropped: DropCounts::default(),
            unparsed_times: 0,
            deduplicated: 0,
            new_records: 0,
            inserted: 0,
            skipped: 0,
            missing_columns: Vec::new(),
            unexpected_columns: Vec::new(),
            error: None,
        }
    }

    pub fn log(&self) {
        let kind = self.kind.map(RecordKind::as_str).unwrap_or("all");
        if let Some(err) = &self.error {
            error!(
                source = %self.source,
                kind,
                fetched = self.fetched,
                error = %err,
                "source summary"
            );
            return;
        }
        info!(
            source = %self.source,
            kind,
            fetched = self.fetched,
            invalid_date = self.dropped.invalid_date,
            future_date = self.dropped.future_date,
            invalid_phone = self.dropped.invalid_phone,
            invalid_contact = self.dropped.invalid_contact,
            unparsed_times = self.unparsed_times,
            deduplicated = self.deduplicated,
            new_records = self.new_records,
            inserted = self.inserted,
            skipped = self.skipped,
            missing_columns = ?self.missing_columns,
            unexpected_columns = ?self.unexpected_columns,
            "source summary"
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub sources: Vec<SourceSummary>,
}

impl RunSummary {
    pub fn totals(&self) -> SourceSummary {
        let mut total = SourceSummary {
            kind: None,
            ..SourceSummary::new(RecordKind::Leads, "TOTAL")
        };
        for s in &self.sources {
            total.fetched += s.fetched;
            total.dropped.absorb(&s.dropped);
            total.unparsed_times += s.unparsed_times;
            total.deduplicated += s.deduplicated;
            total.new_records += s.new_records;
            total.inserted += s.inserted;
            total.skipped += s.skipped;
        }
        let failed = self.sources.iter().filter(|s| s.error.is_some()).count();
        if failed > 0 {
            total.error = Some(format!("{failed} source(s) failed"));
        }
        total
    }

    pub fn has_errors(&self) -> bool {
        self.sources.iter().any(|s| s.error.is_some())
    }

    pub fn log(&self) {
        for source in &self.sources {
            source.log();
        }
        let total = self.totals();
        info!(
            run_id = %self.run_id,
            command = %self.command,
            dry_run = self.dry_run,
            sources = self.sources.len(),
            fetched = total.fetched,
            dropped = total.dropped.total(),
            deduplicated = total.deduplicated,
            new_records = total.new_records,
            inserted = total.inserted,
            skipped = total.skipped,
            failed = self.sources.iter().filter(|s| s.error.is_some()).count(),
            "TOTAL"
        );
    }

    /// Fixed-width table for terminal output.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let inserted_label = if self.dry_run { "Would Ins" } else { "Inserted" };
        let _ = writeln!(
            out,
            "{:<28} {:>8} {:>8} {:>8} {:>8} {:>9} {:>8}  {}",
            "Source", "Fetched", "Dropped", "Dedup", "New", inserted_label, "Skipped", "Error"
        );
        let _ = writeln!(out, "{}", "-".repeat(96));
        let total = self.totals();
        for s in self.sources.iter().chain(std::iter::once(&total)) {
            if std::ptr::eq(s, &total) {
                let _ = writeln!(out, "{}", "-".repeat(96));
            }
            let _ = writeln!(
                out,
                "{:<28} {:>8} {:>8} {:>8} {:>8} {:>9} {:>8}  {}",
                truncate(&s.source, 28),
                s.fetched,
                s.dropped.total(),
                s.deduplicated,
                s.new_records,
                s.inserted,
                s.skipped,
                s.error.as_deref().map(|e| truncate(e, 60)).unwrap_or_default()
            );
        }
        out
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunSummary {
        let mut a = SourceSummary::new(RecordKind::Leads, "Sheet1");
        a.fetched = 10;
        a.dropped.invalid_phone = 2;
        a.inserted = 7;
        a.skipped = 1;
        let mut b = SourceSummary::new(RecordKind::Leads, "ACCA");
        b.error = Some("fetching ACCA: http status 503".into());
        RunSummary {
            run_id: Uuid::nil(),
            command: "ingest-leads".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: false,
            sources: vec![a, b],
        }
    }

    #[test]
    fn totals_add_up_and_flag_failures() {
        let run = run();
        let total = run.totals();
        assert_eq!(total.fetched, 10);
        assert_eq!(total.dropped.total(), 2);
        assert_eq!(total.inserted, 7);
        assert_eq!(total.error.as_deref(), Some("1 source(s) failed"));
        assert!(run.has_errors());
    }

    #[test]
    fn table_lists_sources_then_total() {
        let table = run().render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("Source"));
        assert!(lines[2].starts_with("Sheet1"));
        assert!(lines[3].contains("http status 503"));
        assert!(lines.last().expect("total line").starts_with("TOTAL"));
    }

    #[test]
    fn long_text_is_truncated() {
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
