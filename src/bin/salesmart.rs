//! salesmart — build and query the sales mart
//!
//! # Usage
//!
//! ```bash
//! # Rebuild the mart from scratch
//! salesmart etl --fresh
//!
//! # Generic query (dry run shows SQL only)
//! salesmart query '{"metrics":["COUNT(sale_id) AS n"],"dimensions":["channel_name"]}' --dry-run
//!
//! # Catalog report
//! salesmart report sales_by_day --month 2025-05
//! ```

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use salesmart::etl::flatten::{FCT_PRODUCT_SALES_TABLE, FCT_SALES_TABLE, SALES_MART_TABLE};
use salesmart::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "salesmart")]
#[command(version)]
#[command(about = "Chunked sales ETL and mart analytics", long_about = None)]
#[command(after_help = "EXAMPLES:
    salesmart etl --fresh --chunk-size 50000
    salesmart query @request.json --format json
    salesmart report sales_by_store")]
struct Cli {
    /// Config file (defaults to <config dir>/salesmart/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source database URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Mart file path
    #[arg(long, env = "SALESMART_MART", global = true)]
    mart: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Flat,
    Split,
}

impl From<LayoutArg> for MartLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Flat => MartLayout::Flat,
            LayoutArg::Split => MartLayout::Split,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract from the source and (re)build the mart tables
    Etl {
        /// Delete the mart file before loading
        #[arg(long)]
        fresh: bool,

        /// Rows per batch
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Table layout
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,
    },
    /// Compile and run a generic query request (JSON text or @file)
    Query {
        request: String,

        /// Mart table to query
        #[arg(
            long,
            default_value = FCT_SALES_TABLE,
            value_parser = [FCT_SALES_TABLE, FCT_PRODUCT_SALES_TABLE, SALES_MART_TABLE]
        )]
        table: String,

        /// Don't execute, just show the generated SQL
        #[arg(short, long)]
        dry_run: bool,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Run a catalog report
    Report {
        name: String,

        /// Month bucket (YYYY-MM) for drill-down reports
        #[arg(long)]
        month: Option<String>,

        /// Best first instead of worst first (delivery_by_neighborhood)
        #[arg(long)]
        ascending: bool,

        #[arg(short, long)]
        dry_run: bool,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// List catalog reports
    Reports,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("salesmart=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = MartConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    if let Some(mart) = cli.mart {
        config.mart_path = mart;
    }

    match cli.command {
        Commands::Etl {
            fresh,
            chunk_size,
            layout,
        } => {
            if let Some(rows) = chunk_size {
                config.chunk_size = rows;
            }
            if let Some(layout) = layout {
                config.layout = layout.into();
            }
            config.validate()?;
            run_etl(&config, fresh).await
        }
        Commands::Query {
            request,
            table,
            dry_run,
            format,
        } => {
            let text = match request.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
                None => request,
            };
            let request = QueryRequest::from_json(&text).context("parsing query request")?;
            let compiled = QueryCompiler::new(table)
                .with_default_limit(config.default_limit)
                .compile(&request)?;
            execute(&config, &compiled, dry_run, format).await
        }
        Commands::Report {
            name,
            month,
            ascending,
            dry_run,
            format,
        } => {
            let report = Report::from_name(&name)?;
            let compiled = report.compile(&ReportArgs { month, ascending })?;
            execute(&config, &compiled, dry_run, format).await
        }
        Commands::Reports => {
            show_reports();
            Ok(())
        }
    }
}

async fn run_etl(config: &MartConfig, fresh: bool) -> anyhow::Result<()> {
    let Some(url) = config.database_url.as_deref() else {
        bail!("No database URL. Use --database-url or set DATABASE_URL");
    };

    if fresh && config.mart_path.exists() {
        std::fs::remove_file(&config.mart_path)
            .with_context(|| format!("removing {}", config.mart_path.display()))?;
        println!("{} Removed old mart {}", "✓".green(), config.mart_path.display());
    }

    let specs = config.layout.table_specs(&config.flatten_policy());
    let pipeline = Pipeline::new(config.chunk_size)?;
    let report = pipeline.run(&PgConnector::new(url), &config.mart_path, &specs).await?;

    println!();
    for table in &report.tables {
        match &table.outcome {
            TableOutcome::Loaded { rows, batches } => println!(
                "{} {} {} rows in {} batch(es)",
                "✓".green(),
                table.table.cyan(),
                rows.to_string().white().bold(),
                batches
            ),
            TableOutcome::NoData => println!("{} {} no data, table removed", "–".yellow(), table.table.cyan()),
            TableOutcome::Failed { rows_written, error } => println!(
                "{} {} failed after {} rows: {}",
                "✗".red(),
                table.table.cyan(),
                rows_written,
                error.red()
            ),
        }
    }
    println!();
    println!("{} row(s) loaded into {}", report.total_rows().to_string().cyan(), config.mart_path.display());

    if report.has_failures() {
        bail!("one or more tables failed to load");
    }
    Ok(())
}

async fn execute(
    config: &MartConfig,
    compiled: &CompiledQuery,
    dry_run: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if dry_run {
        println!("{}", "Generated SQL:".green().bold());
        println!("{}", compiled.sql.white());
        if !compiled.params.is_empty() {
            println!();
            println!("{}", "Bindings:".cyan());
            for (i, p) in compiled.params.iter().enumerate() {
                println!("  ?{} = {}", i + 1, p.to_string().yellow());
            }
        }
        return Ok(());
    }

    let reader = MartReader::open(&config.mart_path).await?;
    let response = reader.run(compiled).await;
    reader.close().await;
    let response = response?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table => format_table(&response.data),
    }
    Ok(())
}

fn format_table(records: &[Record]) {
    if records.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let columns: Vec<&str> = records[0].columns().collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for record in records {
        for (i, (_, value)) in record.fields().iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(val_to_string(value).chars().count());
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for record in records {
        let cells: Vec<String> = record
            .fields()
            .iter()
            .zip(&widths)
            .map(|((_, v), w)| format!("{:width$}", val_to_string(v), width = w))
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", records.len().to_string().cyan());
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn show_reports() {
    println!("{}", "Report catalog".cyan().bold());
    println!();
    println!(
        "{:26} {:20} {}",
        "Name".white().bold(),
        "Table".white().bold(),
        "Description".white().bold()
    );
    println!("{}", "─".repeat(80).dimmed());
    for report in Report::ALL {
        println!(
            "{:26} {:20} {}",
            report.name().cyan().bold(),
            report.table().yellow(),
            report.description().dimmed()
        );
    }
}
