use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::summary::RunSummary;

/// Write `run_summary.json` and `summary.md` under `<dir>/<run_id>/`.
pub async fn write_reports(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let run_dir = dir.join(summary.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(run_dir.join("run_summary.json"), json)
        .await
        .context("writing run_summary.json")?;

    fs::write(run_dir.join("summary.md"), render_markdown(summary))
        .await
        .context("writing summary.md")?;

    Ok(run_dir)
}

fn render_markdown(summary: &RunSummary) -> String {
    let total = summary.totals();
    let mut lines = vec![
        format!("# Plutus ingest: {}", summary.command),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- Dry run: {}", summary.dry_run),
        format!("- Fetched: {}", total.fetched),
        format!("- Inserted: {}", total.inserted),
        format!("- Skipped: {}", total.skipped),
        String::new(),
        "## Sources".to_string(),
        String::new(),
        "| Source | Fetched | Dropped | Dedup | New | Inserted | Skipped | Error |".to_string(),
        "|---|---:|---:|---:|---:|---:|---:|---|".to_string(),
    ];
    for s in &summary.sources {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            s.source,
            s.fetched,
            s.dropped.total(),
            s.deduplicated,
            s.new_records,
            s.inserted,
            s.skipped,
            s.error.as_deref().unwrap_or("").replace('|', "\\|")
        ));
    }

    let drifted: Vec<String> = summary
        .sources
        .iter()
        .filter(|s| !s.missing_columns.is_empty() || !s.unexpected_columns.is_empty())
        .map(|s| {
            format!(
                "- {}: missing [{}], unexpected [{}]",
                s.source,
                s.missing_columns.join(", "),
                s.unexpected_columns.join(", ")
            )
        })
        .collect();
    if !drifted.is_empty() {
        lines.push(String::new());
        lines.push("## Column drift".to_string());
        lines.push(String::new());
        lines.extend(drifted);
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SourceSummary;
    use chrono::Utc;
    use plutus_core::RecordKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn reports_land_under_the_run_id() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut source = SourceSummary::new(RecordKind::Assignments, "mofu-api");
        source.fetched = 3;
        source.unexpected_columns = vec!["team".into()];
        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            command: "ingest-assignments".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: true,
            sources: vec![source],
        };

        let dir = write_reports(tmp.path(), &summary).await.expect("write");
        assert_eq!(dir, tmp.path().join(summary.run_id.to_string()));

        let json: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.join("run_summary.json")).expect("json file"),
        )
        .expect("json");
        assert_eq!(json["sources"][0]["fetched"], 3);
        assert_eq!(json["sources"][0]["kind"], "assignments");

        let md = std::fs::read_to_string(dir.join("summary.md")).expect("md");
        assert!(md.contains("| mofu-api | 3 |"));
        assert!(md.contains("unexpected [team]"));
    }
}
