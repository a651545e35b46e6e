//! Read-only execution engine for compiled mart queries.
//!
//! Any number of readers may share a mart file; the pool never writes.

use crate::error::{MartError, MartResult};
use crate::query::transpiler::CompiledQuery;
use crate::value::bind_value;

use serde::Serialize;
use serde::ser::SerializeMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::Path;

/// One result row. Column order follows the query's SELECT list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, serde_json::Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Later fields with the same name shadow earlier ones on lookup.
    pub fn push(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn fields(&self) -> &[(String, serde_json::Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Response body for a generic query: the SQL, its bindings and the rows.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query_sql: String,
    pub params: Vec<crate::value::Value>,
    pub count: usize,
    pub data: Vec<Record>,
}

/// A read-only handle to the mart.
#[derive(Clone)]
pub struct MartReader {
    pool: SqlitePool,
}

impl MartReader {
    /// Open an existing mart file read-only.
    ///
    /// Fails with [`MartError::DestinationUnavailable`] if the file is missing
    /// or cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> MartResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MartError::DestinationUnavailable(format!(
                "mart file '{}' does not exist; run the ETL first",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| MartError::DestinationUnavailable(format!("{}: {}", path.display(), e)))?;

        Ok(Self { pool })
    }

    /// Execute a compiled query and collect every row.
    pub async fn execute(&self, compiled: &CompiledQuery) -> MartResult<Vec<Record>> {
        let mut query = sqlx::query(&compiled.sql);
        for param in &compiled.params {
            query = bind_value(query, param);
        }

        let rows: Vec<SqliteRow> = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MartError::execution(&compiled.sql, e.to_string()))?;

        rows.iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MartError::execution(&compiled.sql, e.to_string()))
    }

    /// Execute and wrap the rows with the query that produced them.
    pub async fn run(&self, compiled: &CompiledQuery) -> MartResult<QueryResponse> {
        let data = self.execute(compiled).await?;
        Ok(QueryResponse {
            query_sql: compiled.sql.clone(),
            params: compiled.params.clone(),
            count: data.len(),
            data,
        })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Convert a row to a record using each value's storage class.
fn row_to_record(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();

    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" if column.type_info().name() == "BOOLEAN" => {
                    serde_json::Value::Bool(row.try_get_unchecked::<i64, _>(i)? != 0)
                }
                "INTEGER" => serde_json::Value::Number(row.try_get_unchecked::<i64, _>(i)?.into()),
                "REAL" => serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                "BLOB" => serde_json::Value::String(format!(
                    "<{} bytes>",
                    row.try_get_unchecked::<Vec<u8>, _>(i)?.len()
                )),
                _ => serde_json::Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        record.push(column.name(), value);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_keeps_column_order() {
        let mut record = Record::new();
        record.push("faturamento", json!(10.5));
        record.push("store_name", json!("Loja 1"));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"faturamento":10.5,"store_name":"Loja 1"}"#
        );
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["faturamento", "store_name"]);
        assert_eq!(record.get("store_name"), Some(&json!("Loja 1")));
        assert_eq!(record.get("nope"), None);
    }

    #[tokio::test]
    async fn test_missing_mart_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = MartReader::open(dir.path().join("absent.db")).await.err().unwrap();
        assert!(matches!(err, MartError::DestinationUnavailable(_)));
    }
}
