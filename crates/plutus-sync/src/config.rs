use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use plutus_adapters::SheetsAuth;
use plutus_storage::DEFAULT_LADDER;

pub const DEFAULT_SOURCES_FILE: &str = "sources.yaml";
pub const DEFAULT_LOCAL_TZ: &str = "Asia/Kolkata";
pub const DEFAULT_ROLLBACK_DAYS: i64 = 3;
pub const MAX_ROLLBACK_DAYS: i64 = 36_500;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Everything the pipeline needs from the environment, read once at startup.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub sources_file: PathBuf,
    pub reports_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub watermark_rollback_days: i64,
    pub batch_ladder: Vec<usize>,
    pub local_tz: Tz,
    pub sheets: SheetsAuth,
    /// Snapshot used to expand `${VAR}` references in the source registry.
    pub vars: BTreeMap<String, String>,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let watermark_rollback_days = match get("PLUTUS_WATERMARK_ROLLBACK_DAYS") {
            Some(v) => v
                .parse::<i64>()
                .with_context(|| format!("invalid PLUTUS_WATERMARK_ROLLBACK_DAYS {v:?}"))?,
            None => DEFAULT_ROLLBACK_DAYS,
        };
        if watermark_rollback_days < 0 {
            bail!("PLUTUS_WATERMARK_ROLLBACK_DAYS must not be negative");
        }
        if watermark_rollback_days > MAX_ROLLBACK_DAYS {
            bail!("PLUTUS_WATERMARK_ROLLBACK_DAYS must be at most {MAX_ROLLBACK_DAYS}");
        }

        let http_timeout_secs = match get("PLUTUS_HTTP_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("invalid PLUTUS_HTTP_TIMEOUT_SECS {v:?}"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let batch_ladder = match get("PLUTUS_BATCH_LADDER") {
            Some(v) => parse_ladder(&v)?,
            None => DEFAULT_LADDER.to_vec(),
        };

        let tz_name = get("PLUTUS_LOCAL_TZ").unwrap_or_else(|| DEFAULT_LOCAL_TZ.to_string());
        let local_tz: Tz = tz_name
            .parse()
            .map_err(|err| anyhow!("invalid PLUTUS_LOCAL_TZ {tz_name:?}: {err}"))?;

        Ok(Self {
            database_url,
            sources_file: get("PLUTUS_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCES_FILE)),
            reports_dir: get("PLUTUS_REPORTS_DIR").map(PathBuf::from),
            artifacts_dir: get("PLUTUS_ARTIFACTS_DIR").map(PathBuf::from),
            user_agent: get("PLUTUS_USER_AGENT").unwrap_or_else(|| "plutus-ingest/0.1".to_string()),
            http_timeout_secs,
            watermark_rollback_days,
            batch_ladder,
            local_tz,
            sheets: SheetsAuth {
                api_key: get("GOOGLE_SHEETS_API_KEY"),
                access_token: get("GOOGLE_SHEETS_ACCESS_TOKEN"),
                api_base: get("GOOGLE_SHEETS_API_BASE"),
            },
            vars,
        })
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

fn parse_ladder(text: &str) -> Result<Vec<usize>> {
    let sizes = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid PLUTUS_BATCH_LADDER entry {part:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if sizes.iter().all(|size| *size == 0) {
        bail!("PLUTUS_BATCH_LADDER needs at least one positive size");
    }
    Ok(sizes)
}
