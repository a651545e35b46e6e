//! Pipeline orchestration: extractor → writer for each table spec.
//!
//! Tables load in sequence. A failure aborts only the current table (which
//! may be left partially loaded) and the run moves on to the next spec.
//! Extraction and loading never overlap, so at most one batch is resident.

use crate::error::{MartError, MartResult};
use crate::etl::extract::{ChunkSource, Extractor, SourceConnector};
use crate::etl::flatten::TableSpec;
use crate::etl::writer::{LoadState, MartWriter, TableLoad};

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Default rows per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Result of loading one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// All batches written and the row count verified.
    Loaded { rows: u64, batches: usize },
    /// The source returned nothing; the table is absent from the mart.
    NoData,
    /// Aborted; `rows_written` rows from earlier batches remain in the table.
    Failed { rows_written: u64, error: String },
}

impl TableOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }
}

/// Per-table report entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
}

impl RunReport {
    /// Total rows loaded across successful tables.
    pub fn total_rows(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Loaded { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(|t| t.outcome.is_failure())
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == table).map(|t| &t.outcome)
    }
}

/// Drives extraction and loading for a list of table specs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    chunk_size: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Pipeline {
    pub fn new(chunk_size: usize) -> MartResult<Self> {
        if chunk_size == 0 {
            return Err(MartError::Config("chunk_size must be greater than zero".into()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run every spec against the mart at `dest`.
    ///
    /// Only a destination that cannot be opened fails the run as a whole;
    /// per-table failures are reported in the returned [`RunReport`].
    pub async fn run<C: SourceConnector>(
        &self,
        connector: &C,
        dest: impl AsRef<Path>,
        specs: &[TableSpec],
    ) -> MartResult<RunReport> {
        let mut writer = MartWriter::open(dest).await?;
        let mut report = RunReport::default();

        for spec in specs {
            info!(table = %spec.table_name, chunk_size = self.chunk_size, "loading table");
            let mut load = TableLoad::new(&spec.table_name);

            let outcome = match self.load_table(connector, &mut writer, spec, &mut load).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(table = %spec.table_name, rows_written = load.rows(), "table load aborted: {}", e);
                    TableOutcome::Failed {
                        rows_written: load.rows(),
                        error: e.to_string(),
                    }
                }
            };

            if let TableOutcome::Loaded { rows, batches } = &outcome {
                info!(table = %spec.table_name, rows, batches, "table loaded");
            } else if outcome == TableOutcome::NoData {
                info!(table = %spec.table_name, "no data; table dropped");
            }

            report.tables.push(TableReport {
                table: spec.table_name.clone(),
                outcome,
            });
        }

        Ok(finish(report, writer.close().await))
    }

    async fn load_table<C: SourceConnector>(
        &self,
        connector: &C,
        writer: &mut MartWriter,
        spec: &TableSpec,
        load: &mut TableLoad,
    ) -> MartResult<TableOutcome> {
        let source = connector.open(&spec.query).await?;
        let mut extractor = Extractor::new(source, self.chunk_size)?;

        let drained = drain(&mut extractor, writer, load).await;
        let released = extractor.close().await;
        let written = drained?;
        if let Err(e) = released {
            warn!(table = %spec.table_name, "failed to release source: {}", e);
        }

        if written == 0 {
            writer.drop_table(&spec.table_name).await?;
            return Ok(TableOutcome::NoData);
        }

        let actual = writer.count_rows(&spec.table_name).await?;
        if actual != written {
            return Err(MartError::VerificationFailed {
                table: spec.table_name.clone(),
                expected: written,
                actual,
            });
        }

        Ok(TableOutcome::Loaded {
            rows: written,
            batches: batches_written(load),
        })
    }
}

async fn drain<S: ChunkSource>(
    extractor: &mut Extractor<S>,
    writer: &mut MartWriter,
    load: &mut TableLoad,
) -> MartResult<u64> {
    while let Some(batch) = extractor.next_batch().await? {
        load.write(writer, &batch).await?;
    }
    Ok(load.rows())
}

/// A writer that fails to close after every table finished does not void the report.
fn finish(report: RunReport, closed: MartResult<()>) -> RunReport {
    if let Err(e) = closed {
        warn!("failed to close mart writer: {}", e);
    }
    report
}

fn batches_written(load: &TableLoad) -> usize {
    match load.state() {
        LoadState::Loaded { batches, .. } => *batches,
        LoadState::NotStarted => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(Pipeline::new(0).is_err());
        assert_eq!(Pipeline::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_report_totals() {
        let report = RunReport {
            tables: vec![
                TableReport {
                    table: "fct_sales".into(),
                    outcome: TableOutcome::Loaded { rows: 250, batches: 3 },
                },
                TableReport {
                    table: "fct_product_sales".into(),
                    outcome: TableOutcome::Failed {
                        rows_written: 100,
                        error: "boom".into(),
                    },
                },
            ],
        };
        assert_eq!(report.total_rows(), 250);
        assert!(report.has_failures());
        assert_eq!(report.outcome("missing"), None);
    }

    #[test]
    fn test_close_failure_keeps_report() {
        let report = RunReport {
            tables: vec![TableReport {
                table: "fct_sales".into(),
                outcome: TableOutcome::Loaded { rows: 5, batches: 1 },
            }],
        };
        let closed = Err(MartError::DestinationUnavailable("disk I/O error".into()));
        assert_eq!(finish(report.clone(), closed), report);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let entry = TableReport {
            table: "sales_mart".into(),
            outcome: TableOutcome::NoData,
        };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"table":"sales_mart","status":"no_data"}"#
        );
    }
}
