//! Extract-transform-load path: source → bounded batches → mart tables.

pub mod batch;
pub mod extract;
pub mod flatten;
pub mod pipeline;
pub mod writer;

pub use batch::{Batch, Column, ColumnType};
pub use extract::{ChunkSource, Extractor, PgConnector, SourceConnector, VecConnector, VecSource};
pub use flatten::{FlattenPolicy, MartLayout, PaymentPolicy, ProductlessSales, TableSpec};
pub use pipeline::{Pipeline, RunReport, TableOutcome, TableReport};
pub use writer::{LoadState, MartWriter, TableLoad};
