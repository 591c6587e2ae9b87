use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crimestats::{
    filter::MonthBound,
    query::{DEFAULT_PAGE_SIZE, DEFAULT_TOP_N},
    report, Config, Engine, Filters,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Run one aggregation against the crime dataset and print it as JSON.
#[derive(Parser)]
#[command(author, version, about = "One-shot crime dataset queries")]
struct Args {
    /// YAML config file; environment overrides still apply.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dataset CSV, overriding the config.
    #[arg(long)]
    dataset: Option<PathBuf>,
    #[arg(long)]
    district: Option<String>,
    #[arg(long)]
    unit: Option<String>,
    #[arg(long)]
    beat: Option<String>,
    #[arg(long, requires = "end_month")]
    start_month: Option<String>,
    #[arg(long, requires = "start_month")]
    end_month: Option<String>,
    /// `HH:MM[:SS]`; ignored when a month range is given.
    #[arg(long, requires = "end_time")]
    start_time: Option<String>,
    #[arg(long, requires = "start_time")]
    end_time: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Distinct values of a column, first-seen order.
    Distinct { column: String },
    /// Most frequent values of a column.
    Top {
        column: String,
        #[arg(short, default_value_t = DEFAULT_TOP_N)]
        n: usize,
    },
    /// value -> count for every column.
    Frequency,
    /// Counts per hour, month, week, year or season.
    Series { granularity: String },
    /// Geo points, top crimes and accused demographics.
    Details,
    /// Plain-text summary of the top values of every column.
    Narrative,
    /// One page of geocoded rows, as fed to the heatmap.
    Page {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: usize,
    },
}

impl Args {
    fn filters(&self) -> Filters {
        Filters {
            district: self.district.clone(),
            unit: self.unit.clone(),
            beat: self.beat.clone(),
            start_month: self.start_month.clone().map(MonthBound::Text),
            end_month: self.end_month.clone().map(MonthBound::Text),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }

    fn config(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        cfg.apply_env();
        if let Some(dataset) = &self.dataset {
            cfg.dataset_path = dataset.clone();
        }
        Ok(cfg)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let engine = Engine::new(args.config()?);
    let filters = args.filters();
    info!(dataset = %engine.config().dataset_path.display(), "running query");

    match &args.command {
        Command::Distinct { column } => {
            print_json(&engine.list_distinct_values(column, &filters).await?)?
        }
        Command::Top { column, n } => {
            print_json(&engine.rank_top_n(column, *n, &filters).await?)?
        }
        Command::Frequency => print_json(&engine.full_frequency(&filters).await?)?,
        Command::Series { granularity } => {
            let granularity = granularity.parse()?;
            print_json(&engine.bucketed_counts(granularity, &filters).await?)?
        }
        Command::Details => print_json(&engine.detail_summary(&filters).await?)?,
        Command::Page { page, per_page } => {
            print_json(&engine.page_rows(*page, *per_page, &filters).await?)?
        }
        Command::Narrative => {
            let table = engine
                .full_frequency(&filters)
                .await
                .context("building frequency table")?;
            print!(
                "{}",
                report::narrative(
                    &table,
                    engine.columns(),
                    args.district.as_deref().unwrap_or(""),
                    args.unit.as_deref(),
                )
            );
        }
    }
    Ok(())
}
