//! Error types for salesmart.

use thiserror::Error;

/// The main error type for mart builds and analytical queries.
#[derive(Debug, Error)]
pub enum MartError {
    /// The source store could not be reached.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source rejected the extraction query or returned unusable rows.
    #[error("Source query error: {0}")]
    SourceQuery(String),

    /// A batch's columns differ from the established table schema.
    #[error("Schema mismatch on '{table}': expected [{expected}], found [{found}]")]
    SchemaMismatch {
        table: String,
        expected: String,
        found: String,
    },

    /// Append attempted against a table that does not exist.
    #[error("Table '{0}' does not exist in the mart")]
    MissingTable(String),

    /// Illegal create/append transition for a table load.
    #[error("Invalid load order for '{table}': {message}")]
    LoadOrder { table: String, message: String },

    /// The destination engine failed while writing a batch.
    #[error("Load error on '{table}': {message}")]
    Load { table: String, message: String },

    /// Post-load row count does not match what was written.
    #[error("Verification failed for '{table}': wrote {expected} rows, table has {actual}")]
    VerificationFailed {
        table: String,
        expected: u64,
        actual: u64,
    },

    /// Mart file missing, locked, or otherwise not openable.
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    /// Filter operator outside the closed vocabulary.
    #[error("Unsupported operator: '{0}'")]
    UnsupportedOperator(String),

    /// Order direction outside {asc, desc}.
    #[error("Invalid order direction '{direction}' for column '{column}'. Expected: asc or desc")]
    InvalidOrderDirection { column: String, direction: String },

    /// Structurally invalid query request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The mart engine rejected a compiled query.
    #[error("Query execution error: {message} (query: {sql})")]
    QueryExecution { sql: String, message: String },

    /// Report name not in the catalog.
    #[error("Unknown report: '{0}'")]
    UnknownReport(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MartError {
    /// Create a load error for the given table.
    pub fn load(table: &str, message: impl Into<String>) -> Self {
        Self::Load {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create an illegal-transition error for the given table.
    pub fn load_order(table: &str, message: impl Into<String>) -> Self {
        Self::LoadOrder {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create a query execution error carrying the failing SQL.
    pub fn execution(sql: &str, message: impl Into<String>) -> Self {
        Self::QueryExecution {
            sql: sql.to_string(),
            message: message.into(),
        }
    }

    /// True for errors raised while compiling a request (caller's fault).
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperator(_)
                | Self::InvalidOrderDirection { .. }
                | Self::InvalidRequest(_)
                | Self::UnknownReport(_)
        )
    }
}

/// Result type alias for salesmart operations.
pub type MartResult<T> = Result<T, MartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MartError::UnsupportedOperator("between".into());
        assert_eq!(err.to_string(), "Unsupported operator: 'between'");
        assert!(err.is_request_error());
    }

    #[test]
    fn test_execution_error_carries_sql() {
        let err = MartError::execution("SELECT nope FROM fct_sales", "no such column: nope");
        assert_eq!(
            err.to_string(),
            "Query execution error: no such column: nope (query: SELECT nope FROM fct_sales)"
        );
        assert!(!err.is_request_error());
    }
}
