//! # salesmart — chunked sales ETL and mart analytics
//!
//! > **Flatten once, query fast.**
//!
//! salesmart moves completed sales out of the operational PostgreSQL store
//! into a denormalized mart file under a fixed memory budget, then compiles
//! structured analytical requests into parameterised SQL against that mart.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use salesmart::prelude::*;
//!
//! // Build the mart
//! let config = MartConfig::builder().database("postgres://localhost/sales").build()?;
//! let connector = PgConnector::new(config.database_url.clone().unwrap());
//! let specs = config.layout.table_specs(&config.flatten_policy());
//! let report = Pipeline::new(config.chunk_size)?
//!     .run(&connector, &config.mart_path, &specs)
//!     .await?;
//!
//! // Query it
//! let request = QueryRequest::new()
//!     .metric("SUM(sale_total_amount) AS faturamento")
//!     .dimension("store_name")
//!     .order_by("faturamento", "desc");
//! let compiled = QueryCompiler::new("fct_sales").compile(&request)?;
//! let rows = MartReader::open(&config.mart_path).await?.execute(&compiled).await?;
//! ```
//!
//! ## Components
//!
//! | Module            | Role                                           |
//! |-------------------|------------------------------------------------|
//! | `etl::flatten`    | Flattening queries and their policies          |
//! | `etl::extract`    | Cursor-backed, bounded batch extraction        |
//! | `etl::writer`     | Create-then-append mart table loads            |
//! | `etl::pipeline`   | Per-table orchestration and run reports        |
//! | `query`           | Request → SELECT tree → SQL + parameters       |
//! | `engine`          | Read-only execution against the mart           |
//! | `enrich`          | Customer detail lookup and merge               |

pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod etl;
pub mod query;
pub mod value;

pub mod prelude {
    pub use crate::config::MartConfig;
    pub use crate::engine::{MartReader, QueryResponse, Record};
    pub use crate::enrich::{CustomerContact, CustomerDirectory, StaticDirectory, enrich_records};
    pub use crate::error::*;
    pub use crate::etl::{
        Batch, Column, ColumnType, FlattenPolicy, MartLayout, MartWriter, PgConnector, Pipeline,
        RunReport, TableOutcome, TableSpec, VecConnector,
    };
    pub use crate::query::{CompiledQuery, Filter, QueryCompiler, QueryRequest, Report, ReportArgs};
    pub use crate::value::Value;
}

/// Compile a request against a mart table.
///
/// # Example
///
/// ```
/// use salesmart::query::{Filter, QueryRequest};
///
/// let request = QueryRequest::new()
///     .metric("COUNT(sale_id) AS total_vendas")
///     .dimension("channel_name")
///     .filter(Filter::new("store_name", "eq", "Loja 1"));
/// let compiled = salesmart::compile("fct_sales", &request).unwrap();
/// assert_eq!(
///     compiled.sql,
///     "SELECT COUNT(sale_id) AS total_vendas, channel_name FROM fct_sales WHERE store_name = ? GROUP BY channel_name LIMIT 100"
/// );
/// assert_eq!(compiled.params.len(), 1);
/// ```
pub fn compile(table: &str, request: &query::QueryRequest) -> Result<query::CompiledQuery, error::MartError> {
    query::QueryCompiler::new(table).compile(request)
}
