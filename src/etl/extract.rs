//! Batch extraction from the source store.
//!
//! An [`Extractor`] pulls bounded batches from a [`ChunkSource`] on demand.
//! The sequence is finite and cannot be restarted: each pull advances the
//! underlying cursor, and at most one batch is held at a time.

use crate::error::{MartError, MartResult};
use crate::etl::batch::{Batch, Column, ColumnType};
use crate::value::Value;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column as _, Connection, Executor, Row, TypeInfo};
use tracing::{debug, warn};

/// A forward-only source of row chunks.
#[allow(async_fn_in_trait)]
pub trait ChunkSource {
    /// Fetch up to `max_rows` rows. An empty batch means the source is drained.
    async fn fetch(&mut self, max_rows: usize) -> MartResult<Batch>;

    /// Release the source.
    async fn close(self) -> MartResult<()>
    where
        Self: Sized;
}

/// Opens a [`ChunkSource`] for a query.
#[allow(async_fn_in_trait)]
pub trait SourceConnector {
    type Source: ChunkSource;

    async fn open(&self, query: &str) -> MartResult<Self::Source>;
}

/// Lazy, non-restartable sequence of batches.
pub struct Extractor<S: ChunkSource> {
    source: S,
    chunk_size: usize,
    batches: usize,
    exhausted: bool,
}

impl<S: ChunkSource> Extractor<S> {
    /// Wrap a source. `chunk_size` must be positive.
    pub fn new(source: S, chunk_size: usize) -> MartResult<Self> {
        if chunk_size == 0 {
            return Err(MartError::Config("chunk_size must be greater than zero".into()));
        }
        Ok(Self {
            source,
            chunk_size,
            batches: 0,
            exhausted: false,
        })
    }

    /// Pull the next batch, or `None` once the source is drained.
    pub async fn next_batch(&mut self) -> MartResult<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let batch = match self.source.fetch(self.chunk_size).await {
            Ok(batch) => batch,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        if batch.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        if batch.len() > self.chunk_size {
            self.exhausted = true;
            return Err(MartError::SourceQuery(format!(
                "source returned {} rows for a chunk of {}",
                batch.len(),
                self.chunk_size
            )));
        }
        // A short chunk is the remainder; skip the extra round trip.
        if batch.len() < self.chunk_size {
            self.exhausted = true;
        }

        self.batches += 1;
        debug!(batch = self.batches, rows = batch.len(), "extracted batch");
        Ok(Some(batch))
    }

    /// Number of batches produced so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Release the source, whether or not it was drained.
    pub async fn close(self) -> MartResult<()> {
        self.source.close().await
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

const CURSOR_NAME: &str = "salesmart_extract";

/// Connects to PostgreSQL and declares a server-side cursor per query.
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
}

impl PgConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl SourceConnector for PgConnector {
    type Source = PgCursor;

    async fn open(&self, query: &str) -> MartResult<PgCursor> {
        let conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| MartError::SourceUnavailable(e.to_string()))?;
        PgCursor::declare(conn, query).await
    }
}

/// A `NO SCROLL` cursor inside a read-only transaction.
pub struct PgCursor {
    conn: PgConnection,
}

impl PgCursor {
    /// Begin a read-only transaction on `conn` and declare the cursor.
    pub async fn declare(mut conn: PgConnection, query: &str) -> MartResult<Self> {
        let declare = format!(
            "DECLARE {} NO SCROLL CURSOR FOR {}",
            CURSOR_NAME,
            strip_terminator(query)
        );

        let started = match conn.execute("BEGIN READ ONLY").await {
            Ok(_) => conn.execute(declare.as_str()).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            if let Err(close_err) = conn.close().await {
                warn!("failed to close source connection: {}", close_err);
            }
            return Err(MartError::SourceQuery(e.to_string()));
        }

        Ok(Self { conn })
    }
}

impl ChunkSource for PgCursor {
    async fn fetch(&mut self, max_rows: usize) -> MartResult<Batch> {
        let sql = format!("FETCH FORWARD {} FROM {}", max_rows, CURSOR_NAME);
        let rows: Vec<PgRow> = self
            .conn
            .fetch_all(sql.as_str())
            .await
            .map_err(|e| MartError::SourceQuery(e.to_string()))?;
        rows_to_batch(&rows)
    }

    async fn close(mut self) -> MartResult<()> {
        let ended = self.conn.execute(format!("CLOSE {}; COMMIT", CURSOR_NAME).as_str()).await;
        let closed = self.conn.close().await;
        ended.map_err(|e| MartError::SourceQuery(e.to_string()))?;
        closed.map_err(|e| MartError::SourceUnavailable(e.to_string()))
    }
}

/// Drop a trailing `;` so the query can sit inside `DECLARE ... FOR`.
pub fn strip_terminator(query: &str) -> &str {
    query.trim().trim_end_matches(';').trim_end()
}

/// Map a PostgreSQL type name to a mart column type.
pub fn pg_column_type(type_name: &str) -> Option<ColumnType> {
    match type_name {
        "BOOL" => Some(ColumnType::Boolean),
        "INT2" | "INT4" | "INT8" => Some(ColumnType::Integer),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => Some(ColumnType::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "UUID" => Some(ColumnType::Text),
        "TIMESTAMP" | "TIMESTAMPTZ" => Some(ColumnType::Timestamp),
        "DATE" => Some(ColumnType::Date),
        _ => None,
    }
}

fn rows_to_batch(rows: &[PgRow]) -> MartResult<Batch> {
    let Some(first) = rows.first() else {
        return Ok(Batch::empty());
    };

    let mut columns = Vec::with_capacity(first.columns().len());
    for column in first.columns() {
        let type_name = column.type_info().name();
        let ty = pg_column_type(type_name).ok_or_else(|| {
            MartError::SourceQuery(format!(
                "column '{}' has unsupported type {}",
                column.name(),
                type_name
            ))
        })?;
        columns.push(Column::new(column.name(), ty));
    }

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Vec::with_capacity(columns.len());
        for (i, column) in row.columns().iter().enumerate() {
            record.push(decode_pg(row, i, column.type_info().name())?);
        }
        values.push(record);
    }

    Batch::new(columns, values)
}

fn decode_pg(row: &PgRow, i: usize, type_name: &str) -> MartResult<Value> {
    let err = |e: sqlx::Error| MartError::SourceQuery(e.to_string());
    let value: Value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i).map_err(err)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(i).map_err(err)?.map(|v| v as i64).into(),
        "INT4" => row.try_get::<Option<i32>, _>(i).map_err(err)?.map(|v| v as i64).into(),
        "INT8" => row.try_get::<Option<i64>, _>(i).map_err(err)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i).map_err(err)?.map(|v| v as f64).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i).map_err(err)?.into(),
        "NUMERIC" => match row.try_get_unchecked::<Option<String>, _>(i).map_err(err)? {
            Some(text) => Value::Float(text.parse::<f64>().map_err(|e| {
                MartError::SourceQuery(format!("numeric '{}' in column {}: {}", text, i, e))
            })?),
            None => Value::Null,
        },
        "TIMESTAMP" => match row.try_get::<Option<NaiveDateTime>, _>(i).map_err(err)? {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Null,
        },
        "TIMESTAMPTZ" => match row.try_get::<Option<DateTime<Utc>>, _>(i).map_err(err)? {
            Some(ts) => Value::Timestamp(ts.naive_utc()),
            None => Value::Null,
        },
        "DATE" => match row.try_get::<Option<NaiveDate>, _>(i).map_err(err)? {
            Some(d) => Value::Date(d),
            None => Value::Null,
        },
        "UUID" => row
            .try_get::<Option<sqlx::types::Uuid>, _>(i)
            .map_err(err)?
            .map(|u| u.to_string())
            .into(),
        _ => row.try_get_unchecked::<Option<String>, _>(i).map_err(err)?.into(),
    };
    Ok(value)
}

// ============================================================================
// In-memory
// ============================================================================

/// A source over rows already in memory.
#[derive(Debug, Clone)]
pub struct VecSource {
    columns: Vec<Column>,
    rows: std::vec::IntoIter<Vec<Value>>,
    closed: bool,
}

impl VecSource {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            closed: false,
        }
    }
}

impl ChunkSource for VecSource {
    async fn fetch(&mut self, max_rows: usize) -> MartResult<Batch> {
        if self.closed {
            return Err(MartError::SourceQuery("source is closed".into()));
        }
        let rows: Vec<_> = self.rows.by_ref().take(max_rows).collect();
        if rows.is_empty() {
            return Ok(Batch::empty());
        }
        Batch::new(self.columns.clone(), rows)
    }

    async fn close(mut self) -> MartResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Serves fixed in-memory tables keyed by query text.
///
/// A query that is not registered fails with [`MartError::SourceQuery`], and
/// a connector built with [`VecConnector::unavailable`] refuses every open.
#[derive(Debug, Clone, Default)]
pub struct VecConnector {
    tables: std::collections::HashMap<String, (Vec<Column>, Vec<Vec<Value>>)>,
    unavailable: bool,
}

impl VecConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_table(
        mut self,
        query: impl Into<String>,
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.tables.insert(query.into(), (columns, rows));
        self
    }
}

impl SourceConnector for VecConnector {
    type Source = VecSource;

    async fn open(&self, query: &str) -> MartResult<VecSource> {
        if self.unavailable {
            return Err(MartError::SourceUnavailable("connection refused".into()));
        }
        let (columns, rows) = self
            .tables
            .get(query)
            .cloned()
            .ok_or_else(|| MartError::SourceQuery(format!("relation for query '{}' does not exist", query)))?;
        Ok(VecSource::new(columns, rows))
    }
}
