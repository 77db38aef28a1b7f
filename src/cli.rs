/*!
InsightEngine Command Line Interface

Executes chart recommendations, pages through raw rows and draws samples from
datasets laid out as `<root>/<dataset>/{data.csv,schema.json,recommendations.json}`.
Results are printed as JSON.
*/

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use insight_engine::catalog::FsCatalog;
use insight_engine::chart::parse_filters;
use insight_engine::percentile::{PercentileKind, PercentileMode, ViewKind};
use insight_engine::{
    Aggregation, ChartRequest, ChartService, RawRowsRequest, Settings, TimeBin, VERSION,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Chart query compilation and execution over uploaded CSV datasets")]
#[command(version = VERSION)]
pub struct Cli {
    /// Catalog root directory
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Settings file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the query timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Include generated SQL in chart results
    #[arg(long, global = true)]
    pub show_sql: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a chart recommendation
    Exec {
        dataset: String,

        recommendation: String,

        #[arg(long)]
        aggregation: Option<Aggregation>,

        #[arg(long)]
        time_bin: Option<TimeBin>,

        #[arg(long)]
        y_column: Option<String>,

        #[arg(long)]
        group_by: Option<String>,

        #[arg(long)]
        group_by_max_distinct: Option<u64>,

        /// Filter token `column|operator|values[|And/Or]` (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,

        #[arg(long, default_value = "base")]
        view: ViewKind,

        #[arg(long, default_value = "none")]
        percentile_mode: PercentileMode,

        #[arg(long)]
        percentile_kind: Option<PercentileKind>,

        #[arg(long)]
        percentile_target: Option<String>,

        /// Write the response here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fetch a page of raw rows
    Rows {
        dataset: String,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long)]
        page_size: Option<usize>,

        /// Sort token `column[:asc|:desc]` (repeatable)
        #[arg(long = "sort")]
        sort: Vec<String>,

        #[arg(long = "filter")]
        filters: Vec<String>,

        #[arg(long)]
        search: Option<String>,

        /// Also compute statistics for this column
        #[arg(long)]
        stats: Option<String>,
    },

    /// Draw a deterministic sample of rows
    Sample {
        dataset: String,

        /// Column to include (repeatable; default all)
        #[arg(long = "column")]
        columns: Vec<String>,

        #[arg(long = "filter")]
        filters: Vec<String>,

        #[arg(long, default_value = "200")]
        cap: usize,
    },

    /// Parse filter tokens and show the result (for debugging)
    Filters {
        tokens: Vec<String>,

        #[arg(long, default_value = "3")]
        max: usize,
    },
}

fn print_json<T: Serialize>(value: &T, output: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Response written to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(timeout) = cli.timeout {
        settings.query_timeout_seconds = timeout;
    }
    if cli.show_sql {
        settings.include_generated_sql = true;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insight_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let service = ChartService::new(FsCatalog::new(&cli.root), settings);

    match cli.command {
        Commands::Exec {
            dataset,
            recommendation,
            aggregation,
            time_bin,
            y_column,
            group_by,
            group_by_max_distinct,
            filters,
            view,
            percentile_mode,
            percentile_kind,
            percentile_target,
            output,
        } => {
            let request = ChartRequest {
                aggregation,
                time_bin,
                y_column,
                group_by,
                group_by_max_distinct,
                filters,
                view,
                percentile_mode,
                percentile_kind,
                percentile_target,
            };
            let response = service
                .resolve_and_execute(&dataset, &recommendation, &request)
                .await?;
            print_json(&response, output.as_ref())?;
        }

        Commands::Rows {
            dataset,
            page,
            page_size,
            sort,
            filters,
            search,
            stats,
        } => {
            let request = RawRowsRequest {
                page,
                page_size,
                sort,
                filters,
                search,
                field_stats_column: stats,
            };
            let response = service.get_raw_rows(&dataset, &request).await?;
            print_json(&response, None)?;
        }

        Commands::Sample {
            dataset,
            columns,
            filters,
            cap,
        } => {
            let rows = service.sample_rows(&dataset, &columns, &filters, cap).await?;
            print_json(&rows, None)?;
        }

        Commands::Filters { tokens, max } => {
            let parsed = parse_filters(&tokens, max);
            print_json(
                &serde_json::json!({
                    "filters": parsed.filters,
                    "errors": parsed.errors,
                }),
                None,
            )?;
            if !parsed.errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
