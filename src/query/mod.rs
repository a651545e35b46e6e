//! Analytical query path: request → SELECT tree → parameterised SQL.

pub mod ast;
pub mod compile;
pub mod reports;
pub mod request;
pub mod transpiler;

pub use compile::{DEFAULT_LIMIT, QueryCompiler};
pub use reports::{Report, ReportArgs};
pub use request::{Filter, OrderBy, QueryRequest};
pub use transpiler::{CompiledQuery, ToSql};
