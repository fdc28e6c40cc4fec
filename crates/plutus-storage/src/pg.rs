use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use plutus_core::{CanonicalRow, CellValue, ColumnKind, ColumnSpec, TableSchema};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

use crate::{row_fingerprint, LatestQuery, RecordStore, StoreError};

const MAX_BIND_PARAMS: usize = 65_535;
// row_hash + payload
const EXTRA_COLUMNS: usize = 2;

/// Translate sqlx failures into the store taxonomy. Unique violations are
/// detected from the driver's error code, never from message text.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::ConstraintViolation {
                constraint: db.constraint().map(str::to_string),
            };
        }
    }
    StoreError::Database(err)
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("applying migrations")?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, schema: &TableSchema, rows: &[CanonicalRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let statement_rows = rows_per_statement(schema.columns.len());
        let mut column_list: Vec<String> = schema.columns.iter().map(|c| quote_ident(c.name)).collect();
        column_list.push("row_hash".to_string());
        column_list.push("payload".to_string());
        let head = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&schema.table),
            column_list.join(", ")
        );

        // One transaction across statements keeps the call all-or-nothing.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for part in rows.chunks(statement_rows) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(head.as_str());
            builder.push_values(part, |mut values, row| {
                for column in &schema.columns {
                    push_cell(&mut values, column, row.get(column.name));
                }
                values.push_bind(row_fingerprint(schema, row));
                values.push_bind(Json(row.payload.to_json()));
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(table = %schema.table, rows = rows.len(), "inserted");
        Ok(rows.len())
    }

    async fn latest(&self, query: &LatestQuery<'_>) -> Result<Option<CellValue>, StoreError> {
        let column = quote_ident(query.column.name);
        let sql = format!(
            "SELECT {column} FROM {table} WHERE {filter} = $1 AND {column} IS NOT NULL \
             ORDER BY {column} DESC NULLS LAST LIMIT 1",
            table = quote_ident(query.table),
            filter = quote_ident(query.filter_column),
        );
        let row = sqlx::query(&sql)
            .bind(query.filter_value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value = match query.column.kind {
            ColumnKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(0)
                .map(|v| v.map(CellValue::Timestamp)),
            ColumnKind::Date => row
                .try_get::<Option<NaiveDate>, _>(0)
                .map(|v| v.map(CellValue::Date)),
            ColumnKind::Integer => row.try_get::<Option<i64>, _>(0).map(|v| v.map(CellValue::Int)),
            ColumnKind::Float => row.try_get::<Option<f64>, _>(0).map(|v| v.map(CellValue::Float)),
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(0)
                .map(|v| v.map(CellValue::Text)),
        }
        .map_err(map_sqlx_error)?;

        Ok(value)
    }
}

fn push_cell(values: &mut Separated<'_, '_, Postgres, &'static str>, column: &ColumnSpec, cell: &CellValue) {
    match column.kind {
        ColumnKind::Text => values.push_bind(cell.as_text()),
        ColumnKind::Integer => values.push_bind(cell.as_i64()),
        ColumnKind::Float => values.push_bind(cell.as_f64().filter(|v| v.is_finite())),
        ColumnKind::Timestamp => values.push_bind(cell.as_timestamp()),
        ColumnKind::Date => values.push_bind(cell.as_date()),
    };
}

fn rows_per_statement(business_columns: usize) -> usize {
    (MAX_BIND_PARAMS / (business_columns + EXTRA_COLUMNS)).max(1)
}

/// Quote a possibly schema-qualified identifier.
fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
