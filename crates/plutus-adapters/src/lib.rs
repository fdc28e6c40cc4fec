//! Tabular source contracts plus the HTTP, Google Sheets and local-file implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plutus_core::{RawRow, ScalarValue};
use plutus_storage::{FetchError, HttpFetcher, RequestAuth};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "plutus-adapters";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

/// Where a table lives. Resolved from the source registry before any fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Sheet { sheet_id: String, tab: String },
    Csv { url: String, api_key: Option<String> },
    File { path: PathBuf },
}

impl SourceLocator {
    pub fn requires_sheets_auth(&self) -> bool {
        matches!(self, Self::Sheet { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTable {
    pub rows: Vec<RawRow>,
    pub raw: Vec<u8>,
    pub extension: &'static str,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("reading {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding sheets response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("google sheets credentials are not configured")]
    MissingCredentials,
    #[error("{0}")]
    Message(String),
}

/// A capability that returns tabular data for a named source.
#[async_trait]
pub trait TabularSource: Send + Sync {
    async fn fetch(
        &self,
        ctx: &AdapterContext,
        source_label: &str,
        locator: &SourceLocator,
    ) -> Result<FetchedTable, AdapterError>;

    /// Whether sheet locators can be served at all.
    fn sheets_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetsAuth {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub api_base: Option<String>,
}

impl SheetsAuth {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.access_token.is_some()
    }

    fn base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_SHEETS_API_BASE)
    }

    fn request_auth(&self) -> RequestAuth {
        match (&self.api_key, &self.access_token) {
            (None, Some(token)) => RequestAuth::Bearer(token.clone()),
            _ => RequestAuth::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTabularSource {
    http: HttpFetcher,
    sheets: SheetsAuth,
}

impl HttpTabularSource {
    pub fn new(http: HttpFetcher, sheets: SheetsAuth) -> Self {
        Self { http, sheets }
    }
}

#[async_trait]
impl TabularSource for HttpTabularSource {
    async fn fetch(
        &self,
        ctx: &AdapterContext,
        source_label: &str,
        locator: &SourceLocator,
    ) -> Result<FetchedTable, AdapterError> {
        match locator {
            SourceLocator::Sheet { sheet_id, tab } => {
                if !self.sheets.is_configured() {
                    return Err(AdapterError::MissingCredentials);
                }
                let url = sheet_values_url(
                    self.sheets.base(),
                    sheet_id,
                    tab,
                    self.sheets.api_key.as_deref(),
                )?;
                let response = self
                    .http
                    .fetch_bytes(ctx.run_id, source_label, url.as_str(), &self.sheets.request_auth())
                    .await?;
                let rows = decode_sheet_values(&response.body)?;
                Ok(FetchedTable {
                    rows,
                    raw: response.body,
                    extension: "json",
                })
            }
            SourceLocator::Csv { url, api_key } => {
                let url = match api_key {
                    Some(key) => with_api_key(url, key)?,
                    None => url.clone(),
                };
                let response = self
                    .http
                    .fetch_bytes(ctx.run_id, source_label, &url, &RequestAuth::None)
                    .await?;
                let rows = parse_csv(&response.body)?;
                Ok(FetchedTable {
                    rows,
                    raw: response.body,
                    extension: "csv",
                })
            }
            SourceLocator::File { path } => read_csv_file(path).await,
        }
    }

    fn sheets_configured(&self) -> bool {
        self.sheets.is_configured()
    }
}

pub async fn read_csv_file(path: &Path) -> Result<FetchedTable, AdapterError> {
    let raw = tokio::fs::read(path).await.map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = parse_csv(&raw)?;
    Ok(FetchedTable {
        rows,
        raw,
        extension: "csv",
    })
}

/// Values endpoint for a whole tab, formatted the way the sheet displays it.
pub fn sheet_values_url(
    base: &str,
    sheet_id: &str,
    tab: &str,
    api_key: Option<&str>,
) -> Result<Url, AdapterError> {
    let mut url = Url::parse(base)
        .map_err(|err| AdapterError::InvalidLocator(format!("sheets api base {base}: {err}")))?;
    let range = format!("'{}'", tab.replace('\'', "''"));
    url.path_segments_mut()
        .map_err(|_| AdapterError::InvalidLocator(format!("sheets api base {base} cannot hold a path")))?
        .pop_if_empty()
        .push(sheet_id)
        .push("values")
        .push(&range);
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");
        if let Some(key) = api_key {
            query.append_pair("key", key);
        }
    }
    Ok(url)
}

/// Append `api_key` unless the URL already carries one.
pub fn with_api_key(url: &str, api_key: &str) -> Result<String, AdapterError> {
    let mut parsed =
        Url::parse(url).map_err(|err| AdapterError::InvalidLocator(format!("csv url: {err}")))?;
    if parsed.query_pairs().any(|(k, _)| k == "api_key") {
        return Ok(url.to_string());
    }
    parsed.query_pairs_mut().append_pair("api_key", api_key);
    Ok(parsed.to_string())
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

/// First row is the header; short rows are padded with nulls and blank rows dropped.
pub fn decode_sheet_values(body: &[u8]) -> Result<Vec<RawRow>, AdapterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let range: ValueRange = serde_json::from_slice(body)?;
    let mut lines = range.values.into_iter();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header
        .iter()
        .map(|cell| match cell {
            JsonValue::String(s) => s.clone(),
            other => ScalarValue::from_json(other).to_text().unwrap_or_default(),
        })
        .collect();

    Ok(lines
        .map(|line| {
            let cells = header.iter().enumerate().filter(|(_, name)| !name.trim().is_empty()).map(
                |(idx, name)| {
                    let value = line.get(idx).map(ScalarValue::from_json).unwrap_or_default();
                    (name.clone(), value)
                },
            );
            RawRow::from_pairs(cells)
        })
        .filter(|row| !is_blank_row(row))
        .collect())
}

pub fn parse_csv(body: &[u8]) -> Result<Vec<RawRow>, AdapterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(body);
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = RawRow::from_pairs(
            header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.trim().is_empty())
                .map(|(idx, name)| {
                    let value = record.get(idx).map(ScalarValue::infer).unwrap_or_default();
                    (name.clone(), value)
                }),
        );
        if !is_blank_row(&row) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn is_blank_row(row: &RawRow) -> bool {
    row.cells().iter().all(|(_, value)| value.is_blank())
}

/// Canned tables keyed by source label, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    tables: HashMap<String, Result<Vec<RawRow>, String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, label: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.tables.insert(label.into(), Ok(rows));
        self
    }

    pub fn with_failure(mut self, label: impl Into<String>, message: impl Into<String>) -> Self {
        self.tables.insert(label.into(), Err(message.into()));
        self
    }
}

#[async_trait]
impl TabularSource for StaticSource {
    async fn fetch(
        &self,
        _ctx: &AdapterContext,
        source_label: &str,
        _locator: &SourceLocator,
    ) -> Result<FetchedTable, AdapterError> {
        match self.tables.get(source_label) {
            Some(Ok(rows)) => Ok(FetchedTable {
                rows: rows.clone(),
                raw: serde_json::to_vec(rows)?,
                extension: "json",
            }),
            Some(Err(message)) => Err(AdapterError::Message(message.clone())),
            None => Err(AdapterError::Message(format!(
                "no static table for {source_label}"
            ))),
        }
    }
}
