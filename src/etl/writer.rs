//! Mart writer: materializes batches into named mart tables.
//!
//! Each write is one destination transaction:
//!
//! 1. the batch is registered as a temporary staging relation,
//! 2. the target is created (replacing any previous table) or checked for an
//!    exact column match,
//! 3. staged rows are copied with `INSERT ... SELECT`.
//!
//! A failure anywhere rolls the transaction back, so previously committed
//! batches stay intact and the failing batch is not applied.

use crate::error::{MartError, MartResult};
use crate::etl::batch::{Batch, Column, ColumnType, describe_columns};
use crate::value::bind_value;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow};
use sqlx::{Connection, Row, Sqlite, Transaction};
use std::path::Path;
use tracing::{debug, info};

const STAGING_TABLE: &str = "__salesmart_batch";

/// Bound on placeholders per `INSERT` statement.
const MAX_BIND_PARAMS: usize = 999;

/// Quote an identifier for the mart engine.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_defs(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Single read-write connection to the mart file.
pub struct MartWriter {
    conn: SqliteConnection,
}

impl MartWriter {
    /// Open (creating if needed) the mart file for writing.
    pub async fn open(path: impl AsRef<Path>) -> MartResult<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // Readers open the file read-only and cannot recover a WAL.
            .journal_mode(SqliteJournalMode::Delete);
        let conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| MartError::DestinationUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self { conn })
    }

    /// Write one batch. `is_first` selects create-or-replace over append.
    pub async fn write(&mut self, table: &str, batch: &Batch, is_first: bool) -> MartResult<u64> {
        if is_first {
            self.create(table, batch).await
        } else {
            self.append(table, batch).await
        }
    }

    /// Create `table` from the batch, atomically replacing any existing table.
    pub async fn create(&mut self, table: &str, batch: &Batch) -> MartResult<u64> {
        if batch.columns().is_empty() {
            return Err(MartError::load(table, "cannot create a table from a batch with no columns"));
        }

        let mut tx = self.conn.begin().await.map_err(|e| MartError::load(table, e.to_string()))?;
        stage(&mut tx, table, batch).await?;

        let target = quote_ident(table);
        run(&mut tx, table, &format!("DROP TABLE IF EXISTS {}", target)).await?;
        run(
            &mut tx,
            table,
            &format!("CREATE TABLE {} ({})", target, column_defs(batch.columns())),
        )
        .await?;
        let inserted = copy_staged(&mut tx, table).await?;

        tx.commit().await.map_err(|e| MartError::load(table, e.to_string()))?;
        info!(table, rows = inserted, "created mart table");
        Ok(inserted)
    }

    /// Append the batch to an existing table with an identical schema.
    pub async fn append(&mut self, table: &str, batch: &Batch) -> MartResult<u64> {
        let existing = self.table_schema(table).await?;
        if existing.is_empty() {
            return Err(MartError::MissingTable(table.to_string()));
        }
        if !batch.same_schema(&existing) {
            return Err(MartError::SchemaMismatch {
                table: table.to_string(),
                expected: describe_columns(&existing),
                found: describe_columns(batch.columns()),
            });
        }

        let mut tx = self.conn.begin().await.map_err(|e| MartError::load(table, e.to_string()))?;
        stage(&mut tx, table, batch).await?;
        let inserted = copy_staged(&mut tx, table).await?;
        tx.commit().await.map_err(|e| MartError::load(table, e.to_string()))?;

        debug!(table, rows = inserted, "appended batch");
        Ok(inserted)
    }

    /// Column list of an existing table, empty if the table does not exist.
    pub async fn table_schema(&mut self, table: &str) -> MartResult<Vec<Column>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let rows: Vec<SqliteRow> = sqlx::query(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MartError::load(table, e.to_string()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get_unchecked("name")
                .map_err(|e| MartError::load(table, e.to_string()))?;
            let declared: String = row
                .try_get_unchecked("type")
                .map_err(|e| MartError::load(table, e.to_string()))?;
            let ty = ColumnType::from_sql_name(&declared).ok_or_else(|| {
                MartError::load(table, format!("column '{}' has foreign type '{}'", name, declared))
            })?;
            columns.push(Column::new(name, ty));
        }
        Ok(columns)
    }

    /// Drop `table` if it exists, so a rerun never serves a previous run's rows.
    pub async fn drop_table(&mut self, table: &str) -> MartResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
        sqlx::query(&sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| MartError::load(table, e.to_string()))?;
        debug!(table, "dropped mart table");
        Ok(())
    }

    /// `SELECT COUNT(*)` against a mart table.
    pub async fn count_rows(&mut self, table: &str) -> MartResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MartError::load(table, e.to_string()))?;
        Ok(count as u64)
    }

    /// Close the connection, flushing the mart file.
    pub async fn close(self) -> MartResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MartError::DestinationUnavailable(e.to_string()))
    }
}

async fn run(tx: &mut Transaction<'_, Sqlite>, table: &str, sql: &str) -> MartResult<()> {
    sqlx::query(sql)
        .execute(&mut **tx)
        .await
        .map_err(|e| MartError::load(table, e.to_string()))?;
    Ok(())
}

/// Register the batch as a temporary relation on this connection.
async fn stage(tx: &mut Transaction<'_, Sqlite>, table: &str, batch: &Batch) -> MartResult<()> {
    let staging = format!("temp.{}", quote_ident(STAGING_TABLE));
    run(tx, table, &format!("DROP TABLE IF EXISTS {}", staging)).await?;
    run(
        tx,
        table,
        &format!("CREATE TEMP TABLE {} ({})", quote_ident(STAGING_TABLE), column_defs(batch.columns())),
    )
    .await?;

    let width = batch.columns().len();
    let rows_per_statement = (MAX_BIND_PARAMS / width).max(1);
    let row_placeholder = format!("({})", vec!["?"; width].join(", "));

    for chunk in batch.rows().chunks(rows_per_statement) {
        let sql = format!(
            "INSERT INTO {} VALUES {}",
            staging,
            vec![row_placeholder.as_str(); chunk.len()].join(", ")
        );
        let mut query = sqlx::query(&sql);
        for value in chunk.iter().flatten() {
            query = bind_value(query, value);
        }
        query
            .execute(&mut **tx)
            .await
            .map_err(|e| MartError::load(table, e.to_string()))?;
    }
    Ok(())
}

/// `INSERT ... SELECT` staged rows into the target, then drop the staging relation.
async fn copy_staged(tx: &mut Transaction<'_, Sqlite>, table: &str) -> MartResult<u64> {
    let staging = format!("temp.{}", quote_ident(STAGING_TABLE));
    let result = sqlx::query(&format!(
        "INSERT INTO {} SELECT * FROM {}",
        quote_ident(table),
        staging
    ))
    .execute(&mut **tx)
    .await
    .map_err(|e| MartError::load(table, e.to_string()))?;
    run(tx, table, &format!("DROP TABLE {}", staging)).await?;
    Ok(result.rows_affected())
}

/// Explicit per-table load state: `NotStarted` → `Loaded`, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotStarted,
    Loaded { rows: u64, batches: usize },
}

/// Tracks one table's load within a run.
#[derive(Debug, Clone)]
pub struct TableLoad {
    table: String,
    state: LoadState,
}

impl TableLoad {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: LoadState::NotStarted,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Rows written so far in this load.
    pub fn rows(&self) -> u64 {
        match self.state {
            LoadState::NotStarted => 0,
            LoadState::Loaded { rows, .. } => rows,
        }
    }

    /// The single legal transition: create the table from the first batch.
    pub async fn create(&mut self, writer: &mut MartWriter, batch: &Batch) -> MartResult<u64> {
        if self.state != LoadState::NotStarted {
            return Err(MartError::load_order(&self.table, "table already created in this run"));
        }
        let rows = writer.create(&self.table, batch).await?;
        self.state = LoadState::Loaded { rows, batches: 1 };
        Ok(rows)
    }

    /// Append a later batch. Rejected until [`TableLoad::create`] has succeeded.
    pub async fn append(&mut self, writer: &mut MartWriter, batch: &Batch) -> MartResult<u64> {
        let LoadState::Loaded { rows, batches } = self.state else {
            return Err(MartError::load_order(&self.table, "append before create"));
        };
        let added = writer.append(&self.table, batch).await?;
        self.state = LoadState::Loaded {
            rows: rows + added,
            batches: batches + 1,
        };
        Ok(added)
    }

    /// Create on the first batch, append afterwards.
    pub async fn write(&mut self, writer: &mut MartWriter, batch: &Batch) -> MartResult<u64> {
        if self.state == LoadState::NotStarted {
            self.create(writer, batch).await
        } else {
            self.append(writer, batch).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("sale_id", ColumnType::Integer),
            Column::new("store_name", ColumnType::Text),
            Column::new("sale_total_amount", ColumnType::Float),
        ]
    }

    fn batch(range: std::ops::Range<i64>) -> Batch {
        let rows = range
            .map(|i| vec![Value::Int(i), Value::Text(format!("Loja {}", i % 3)), Value::Float(i as f64 * 1.5)])
            .collect();
        Batch::new(columns(), rows).unwrap()
    }

    async fn writer() -> (tempfile::TempDir, MartWriter) {
        let dir = tempfile::tempdir().unwrap();
        let writer = MartWriter::open(dir.path().join("mart.db")).await.unwrap();
        (dir, writer)
    }

    #[tokio::test]
    async fn test_create_then_append() {
        let (_dir, mut writer) = writer().await;
        assert_eq!(writer.write("fct_sales", &batch(0..100), true).await.unwrap(), 100);
        assert_eq!(writer.write("fct_sales", &batch(100..200), false).await.unwrap(), 100);
        assert_eq!(writer.write("fct_sales", &batch(200..250), false).await.unwrap(), 50);
        assert_eq!(writer.count_rows("fct_sales").await.unwrap(), 250);
        assert_eq!(writer.table_schema("fct_sales").await.unwrap(), columns());
    }

    #[tokio::test]
    async fn test_create_replaces_existing_table() {
        let (_dir, mut writer) = writer().await;
        writer.create("fct_sales", &batch(0..10)).await.unwrap();
        writer.create("fct_sales", &batch(0..3)).await.unwrap();
        assert_eq!(writer.count_rows("fct_sales").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_schema_mismatch_leaves_table_untouched() {
        let (_dir, mut writer) = writer().await;
        writer.create("fct_sales", &batch(0..5)).await.unwrap();

        let other = Batch::new(
            vec![
                Column::new("sale_id", ColumnType::Integer),
                Column::new("channel_name", ColumnType::Text),
                Column::new("sale_total_amount", ColumnType::Float),
            ],
            vec![vec![Value::Int(9), Value::Text("iFood".into()), Value::Float(1.0)]],
        )
        .unwrap();

        let err = writer.append("fct_sales", &other).await.unwrap_err();
        assert!(matches!(err, MartError::SchemaMismatch { .. }), "{}", err);
        assert_eq!(writer.count_rows("fct_sales").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_type_change_is_a_schema_mismatch() {
        let (_dir, mut writer) = writer().await;
        writer.create("fct_sales", &batch(0..5)).await.unwrap();

        let retyped = Batch::new(
            vec![
                Column::new("sale_id", ColumnType::Integer),
                Column::new("store_name", ColumnType::Text),
                Column::new("sale_total_amount", ColumnType::Text),
            ],
            vec![vec![Value::Int(9), Value::Text("Loja 1".into()), Value::Text("12.50".into())]],
        )
        .unwrap();

        let err = writer.append("fct_sales", &retyped).await.unwrap_err();
        match err {
            MartError::SchemaMismatch { expected, found, .. } => {
                assert!(expected.contains("DOUBLE"), "{}", expected);
                assert!(found.contains("TEXT"), "{}", found);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
        assert_eq!(writer.count_rows("fct_sales").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_drop_table_is_idempotent() {
        let (_dir, mut writer) = writer().await;
        writer.create("fct_sales", &batch(0..3)).await.unwrap();
        writer.drop_table("fct_sales").await.unwrap();
        writer.drop_table("fct_sales").await.unwrap();
        assert!(writer.table_schema("fct_sales").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_missing_table() {
        let (_dir, mut writer) = writer().await;
        let err = writer.append("nope", &batch(0..1)).await.unwrap_err();
        assert!(matches!(err, MartError::MissingTable(_)));
    }

    #[tokio::test]
    async fn test_large_batch_spans_statements() {
        let (_dir, mut writer) = writer().await;
        assert_eq!(writer.create("big", &batch(0..1200)).await.unwrap(), 1200);
        assert_eq!(writer.count_rows("big").await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_table_load_state_machine() {
        let (_dir, mut writer) = writer().await;
        let mut load = TableLoad::new("fct_sales");

        let err = load.append(&mut writer, &batch(0..1)).await.unwrap_err();
        assert!(matches!(err, MartError::LoadOrder { .. }));
        assert_eq!(load.state(), &LoadState::NotStarted);

        load.write(&mut writer, &batch(0..4)).await.unwrap();
        load.write(&mut writer, &batch(4..6)).await.unwrap();
        assert_eq!(load.state(), &LoadState::Loaded { rows: 6, batches: 2 });

        let err = load.create(&mut writer, &batch(0..1)).await.unwrap_err();
        assert!(matches!(err, MartError::LoadOrder { .. }));
        assert_eq!(writer.count_rows("fct_sales").await.unwrap(), 6);
    }
}
