//! Ingestion pipeline orchestration.
//!
//! Each source runs fetch, normalize, validate, dedup, incremental filter and
//! batched write, strictly one after another. A failing source is recorded in
//! the run summary and the remaining sources still run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use plutus_adapters::{AdapterContext, HttpTabularSource, SourceLocator, TabularSource};
use plutus_core::{CanonicalRow, RecordKind, TableSchema};
use plutus_storage::{
    BatchWriter, HttpClientConfig, HttpFetcher, PgRecordStore, RawArchive, RecordStore,
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod assignments;
pub mod config;
pub mod dedup;
pub mod incremental;
pub mod leads;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod summary;
pub mod transactions;
pub mod watermark;
pub mod webinar;

pub use config::IngestConfig;
pub use registry::{LocatorSpec, SourceRegistry};
pub use summary::{DropCounts, RunSummary, SourceSummary, Validated};
pub use watermark::{WatermarkPolicy, WatermarkReader};

use dedup::dedup_exact;
use incremental::{filter_newer, group_by_source};
use normalize::normalize;

pub const CRATE_NAME: &str = "plutus-sync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestCommand {
    /// All enabled lead sheets, or the one whose name or tab matches `sheet`.
    Leads { sheet: Option<String> },
    Transactions,
    Assignments,
    Webinar,
}

impl IngestCommand {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Leads { .. } => RecordKind::Leads,
            Self::Transactions => RecordKind::Transactions,
            Self::Assignments => RecordKind::Assignments,
            Self::Webinar => RecordKind::Webinar,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Leads { .. } => "ingest-leads",
            Self::Transactions => "ingest-transactions",
            Self::Assignments => "ingest-assignments",
            Self::Webinar => "ingest-webinar",
        }
    }
}

/// A fully resolved source: where to fetch from and which table to write.
#[derive(Debug, Clone)]
pub struct IngestTarget {
    pub kind: RecordKind,
    pub label: String,
    pub schema: TableSchema,
    pub locator: SourceLocator,
}

pub struct IngestPipeline {
    config: IngestConfig,
    registry: SourceRegistry,
    store: Arc<dyn RecordStore>,
    source: Arc<dyn TabularSource>,
    archive: Option<RawArchive>,
    writer: BatchWriter,
    watermark: WatermarkPolicy,
}

impl IngestPipeline {
    /// Production wiring: Postgres store and HTTP/Sheets/file source.
    pub async fn connect(config: IngestConfig) -> Result<Self> {
        let registry = SourceRegistry::load(&config.sources_file)?;
        let store = PgRecordStore::connect(&config.database_url).await?;
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..HttpClientConfig::default()
        })?;
        let source = HttpTabularSource::new(http, config.sheets.clone());
        Ok(Self::with_backends(
            config,
            registry,
            Arc::new(store),
            Arc::new(source),
        ))
    }

    pub fn with_backends(
        config: IngestConfig,
        registry: SourceRegistry,
        store: Arc<dyn RecordStore>,
        source: Arc<dyn TabularSource>,
    ) -> Self {
        Self {
            archive: config.artifacts_dir.clone().map(RawArchive::new),
            writer: BatchWriter::new(config.batch_ladder.iter().copied()),
            watermark: WatermarkPolicy::with_rollback_days(config.watermark_rollback_days),
            config,
            registry,
            store,
            source,
        }
    }

    pub async fn run(&self, command: &IngestCommand, dry_run: bool) -> Result<RunSummary> {
        self.run_at(command, dry_run, Utc::now()).await
    }

    /// Run with an explicit clock. Errors only for problems found before any
    /// source is touched; per-source failures land in the summary.
    pub async fn run_at(
        &self,
        command: &IngestCommand,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let targets = self.resolve_targets(command)?;
        info!(%run_id, command = command.name(), targets = targets.len(), dry_run, "ingest run started");

        let ctx = AdapterContext {
            run_id,
            fetched_at: started_at,
        };
        let mut sources = Vec::with_capacity(targets.len());
        for target in &targets {
            let span = info_span!(
                "ingest_source",
                %run_id,
                kind = %target.kind,
                source = %target.label
            );
            let mut summary = SourceSummary::new(target.kind, &target.label);
            let result = self
                .process(&ctx, target, dry_run, now, &mut summary)
                .instrument(span)
                .await;
            if let Err(err) = result {
                error!(source = %target.label, error = %format!("{err:#}"), "source failed");
                summary.error = Some(format!("{err:#}"));
            }
            sources.push(summary);
        }

        let summary = RunSummary {
            run_id,
            command: command.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            dry_run,
            sources,
        };
        summary.log();

        if let Some(dir) = &self.config.reports_dir {
            match report::write_reports(dir, &summary).await {
                Ok(path) => info!(path = %path.display(), "run reports written"),
                Err(err) => warn!(error = %format!("{err:#}"), "failed to write run reports"),
            }
        }
        Ok(summary)
    }

    pub fn resolve_targets(&self, command: &IngestCommand) -> Result<Vec<IngestTarget>> {
        let kind = command.kind();
        match command {
            IngestCommand::Leads { sheet } => {
                let section = self
                    .registry
                    .leads
                    .as_ref()
                    .context("sources file has no `leads` section")?;
                let table = section
                    .table
                    .clone()
                    .unwrap_or_else(|| kind.default_table().to_string());
                let selected: Vec<_> = match sheet {
                    Some(filter) => section
                        .sheets
                        .iter()
                        .filter(|s| s.name == *filter || s.locator.tab() == Some(filter.as_str()))
                        .collect(),
                    None => section.sheets.iter().filter(|s| s.enabled).collect(),
                };
                if let (Some(filter), true) = (sheet, selected.is_empty()) {
                    bail!("no lead sheet matches --sheet {filter:?}");
                }
                selected
                    .into_iter()
                    .map(|s| self.target(kind, &table, &s.name, &s.locator))
                    .collect()
            }
            IngestCommand::Transactions => self.single_target(kind, self.registry.transactions.as_ref()),
            IngestCommand::Assignments => self.single_target(kind, self.registry.assignments.as_ref()),
            IngestCommand::Webinar => self.single_target(kind, self.registry.webinar.as_ref()),
        }
    }

    fn single_target(
        &self,
        kind: RecordKind,
        source: Option<&registry::SingleSource>,
    ) -> Result<Vec<IngestTarget>> {
        let source = source.with_context(|| format!("sources file has no `{kind}` section"))?;
        let table = source.table.as_deref().unwrap_or(kind.default_table());
        Ok(vec![self.target(kind, table, &source.name, &source.locator)?])
    }

    fn target(
        &self,
        kind: RecordKind,
        table: &str,
        label: &str,
        spec: &LocatorSpec,
    ) -> Result<IngestTarget> {
        let lookup = |key: &str| self.config.var(key).map(str::to_string);
        let locator = spec
            .resolve(&lookup, &self.registry.base_dir)
            .with_context(|| format!("resolving locator for {label}"))?;
        if locator.requires_sheets_auth() && !self.source.sheets_configured() {
            bail!(
                "{label} is a Google Sheets source but neither GOOGLE_SHEETS_API_KEY nor \
                 GOOGLE_SHEETS_ACCESS_TOKEN is set"
            );
        }
        Ok(IngestTarget {
            kind,
            label: label.to_string(),
            schema: kind.schema(table),
            locator,
        })
    }

    async fn process(
        &self,
        ctx: &AdapterContext,
        target: &IngestTarget,
        dry_run: bool,
        now: DateTime<Utc>,
        summary: &mut SourceSummary,
    ) -> Result<()> {
        let fetched = self
            .source
            .fetch(ctx, &target.label, &target.locator)
            .await
            .with_context(|| format!("fetching {}", target.label))?;
        summary.fetched = fetched.rows.len();
        info!(rows = summary.fetched, "fetched");

        if let Some(archive) = &self.archive {
            match archive
                .store(ctx.fetched_at, &target.label, fetched.extension, &fetched.raw)
                .await
            {
                Ok(path) => debug!(
                    path = %path.display(),
                    bytes = fetched.raw.len(),
                    "raw fetch archived"
                ),
                Err(err) => warn!(error = %format!("{err:#}"), "failed to archive raw fetch"),
            }
        }

        let batch = normalize(&fetched.rows, target.kind.column_map());
        summary.missing_columns = batch.missing_columns;
        summary.unexpected_columns = batch.unexpected_columns;

        let (validated, merged) = match target.kind {
            RecordKind::Leads => (leads::validate(batch.rows, &target.label, now), 0),
            RecordKind::Transactions => (transactions::validate(batch.rows), 0),
            RecordKind::Assignments => (assignments::validate(batch.rows, &self.config.local_tz), 0),
            RecordKind::Webinar => webinar::validate(batch.rows, &target.label, &self.config.local_tz),
        };
        summary.dropped = validated.dropped;
        summary.unparsed_times = validated.unparsed_times;

        let (rows, removed) = dedup_exact(&target.schema, validated.rows);
        summary.deduplicated = merged + removed;

        let rows = self.filter_incremental(&target.schema, rows, now).await?;
        summary.new_records = rows.len();

        if dry_run {
            summary.inserted = rows.len();
            info!(rows = rows.len(), "dry run; nothing written");
            return Ok(());
        }

        let outcome = self.writer.write(self.store.as_ref(), &target.schema, &rows).await;
        summary.inserted = outcome.succeeded;
        summary.skipped = outcome.skipped;
        Ok(())
    }

    /// Per-source watermark filter. Rows without a source tag cannot be matched
    /// to a watermark and pass through.
    async fn filter_incremental(
        &self,
        schema: &TableSchema,
        rows: Vec<CanonicalRow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CanonicalRow>> {
        let (Some(ts_column), Some(source_column)) =
            (schema.kind.watermark_column(), schema.kind.source_column())
        else {
            return Ok(rows);
        };
        if rows.is_empty() {
            return Ok(rows);
        }

        let reader = WatermarkReader::new(self.store.as_ref(), self.watermark);
        let mut kept = Vec::with_capacity(rows.len());
        for (source, group) in group_by_source(rows, source_column) {
            let Some(source) = source else {
                kept.extend(group);
                continue;
            };
            let watermark = reader
                .get_watermark(schema, &source, now)
                .await
                .with_context(|| format!("reading watermark for {source}"))?;
            let before = group.len();
            let newer = filter_newer(group, watermark, ts_column);
            debug!(
                source = %source,
                watermark = ?watermark,
                kept = newer.len(),
                filtered = before - newer.len(),
                "incremental filter applied"
            );
            kept.extend(newer);
        }
        Ok(kept)
    }
}

/// Load config and registry from the environment, connect, and run one command.
pub async fn run_from_env(command: &IngestCommand, dry_run: bool) -> Result<RunSummary> {
    let config = IngestConfig::from_env()?;
    let pipeline = IngestPipeline::connect(config).await?;
    pipeline.run(command, dry_run).await
}

pub async fn migrate_from_env() -> Result<()> {
    let config = IngestConfig::from_env()?;
    let store = PgRecordStore::connect(&config.database_url).await?;
    store.migrate().await?;
    info!("migrations applied");
    Ok(())
}
