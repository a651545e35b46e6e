//! Batches: the bounded unit moved from the extractor to the writer.

use crate::error::{MartError, MartResult};
use crate::value::Value;

/// Mart column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    Date,
}

impl ColumnType {
    /// Declared type used in mart DDL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
        }
    }

    /// Inverse of [`ColumnType::sql_name`], for reading back a table's schema.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BOOLEAN" => Some(ColumnType::Boolean),
            "BIGINT" => Some(ColumnType::Integer),
            "DOUBLE" => Some(ColumnType::Float),
            "TEXT" => Some(ColumnType::Text),
            "TIMESTAMP" => Some(ColumnType::Timestamp),
            "DATE" => Some(ColumnType::Date),
            _ => None,
        }
    }

    /// Whether a value may be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Boolean, Value::Bool(_))
                | (ColumnType::Integer, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::Float, Value::Int(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
                | (ColumnType::Date, Value::Date(_))
        )
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.ty.sql_name())
    }
}

/// Render a column list for diagnostics.
pub fn describe_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An ordered, homogeneous set of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Build a batch, checking every row against the column list.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> MartResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(MartError::SourceQuery(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            for (col, value) in columns.iter().zip(row) {
                if !col.ty.accepts(value) {
                    return Err(MartError::SourceQuery(format!(
                        "row {}: value {} does not fit column {}",
                        i, value, col
                    )));
                }
            }
        }
        Ok(Self { columns, rows })
    }

    /// A batch with no rows and no known columns.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when `other` has exactly the same column names, types and order.
    pub fn same_schema(&self, other: &[Column]) -> bool {
        self.columns == other
    }
}
