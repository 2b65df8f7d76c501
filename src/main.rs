use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod classify;
mod db;
mod error;
mod header;
mod ingest;
mod models;
mod normalize;
mod record;
mod report;
mod streaks;

use db::Store;
use ingest::IngestOptions;
use models::{AgeBand, Level, QueryFilter};

#[derive(Parser)]
#[command(name = "hill-sheet-ledger")]
#[command(about = "Booking history and streak flags for ski-school daily hill sheets", long_about = None)]
struct Cli {
    /// SQLite database holding the booking history
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://hill_sheets.db", global = true)]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Ingest one or more daily hill sheet CSV exports
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Rows searched for the header line before giving up
        #[arg(long, default_value_t = header::DEFAULT_SCAN_ROWS)]
        header_scan_rows: usize,
    },
    /// Show size and date range of the stored history
    Stats,
    /// Booking counts by instructor, age band and level
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Instructor by level booking counts
    Pivot {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Consecutive-day runs at the same dominant level
    Streaks {
        #[arg(long, default_value_t = streaks::DEFAULT_MIN_LENGTH)]
        min_length: usize,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// ISO week number
    #[arg(long)]
    week: Option<u32>,
    /// ISO week-numbering year, so week 1 of one season is not mixed with another
    #[arg(long)]
    week_year: Option<i32>,
    #[arg(long, value_parser = parse_age_band)]
    age_band: Option<AgeBand>,
    #[arg(long, value_parser = parse_level)]
    level: Option<Level>,
    #[arg(long)]
    teaching_only: bool,
}

impl From<FilterArgs> for QueryFilter {
    fn from(args: FilterArgs) -> Self {
        QueryFilter {
            week: args.week,
            week_year: args.week_year,
            age_band: args.age_band,
            level: args.level,
            teaching_only: args.teaching_only,
        }
    }
}

fn parse_age_band(raw: &str) -> Result<AgeBand, String> {
    raw.parse()
}

fn parse_level(raw: &str) -> Result<Level, String> {
    raw.parse()
}

fn output(out: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Store::open(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    let result = run(&store, cli.command).await;
    store.close().await;
    result
}

async fn run(store: &Store, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Ingest {
            files,
            header_scan_rows,
        } => {
            let options = IngestOptions { header_scan_rows };
            let (mut inserted, mut skipped, mut invalid) = (0, 0, 0);

            for path in &files {
                let summary = ingest::ingest_path(store, path, &options)
                    .await
                    .with_context(|| format!("ingestion of {} aborted", path.display()))?;
                println!(
                    "{}: inserted {}, skipped {} duplicates, {} invalid rows (header on line {}, upload {}).",
                    summary.source,
                    summary.inserted_count,
                    summary.skipped_count,
                    summary.invalid_row_count,
                    summary.header_row + 1,
                    summary.upload_id
                );
                for row in &summary.invalid_rows {
                    println!("  line {}: {}", row.line, row.reason);
                }
                inserted += summary.inserted_count;
                skipped += summary.skipped_count;
                invalid += summary.invalid_row_count;
            }

            if files.len() > 1 {
                println!("Total: inserted {inserted}, skipped {skipped}, invalid {invalid}.");
            }
        }
        Commands::Stats => {
            let stats = store.stats().await?;
            println!(
                "{} bookings from {} uploads.",
                stats.total_bookings, stats.uploads
            );
            match (stats.first_date, stats.last_date) {
                (Some(first), Some(last)) => println!("Dates {first} to {last}."),
                _ => println!("No bookings stored yet."),
            }
        }
        Commands::Summary { filter, out } => {
            let rows = store.summary(&filter.into()).await?;
            report::write_summary(output(out.as_ref())?, &rows)?;
        }
        Commands::Pivot { filter, out } => {
            let rows = store.pivot(&filter.into()).await?;
            report::write_pivot(output(out.as_ref())?, &rows)?;
        }
        Commands::Streaks {
            min_length,
            from,
            to,
            out,
        } => {
            let found = streaks::find_streaks_in_store(store, min_length, from, to).await?;
            if found.is_empty() {
                eprintln!("No streaks of {min_length}+ consecutive days found.");
            }
            report::write_streaks(output(out.as_ref())?, &found)?;
        }
    }

    Ok(())
}
