//! Hearth CLI binary.
//!
//! Computes per-property alpha and beta against a market benchmark, for
//! every configured financing scenario, and maintains the aggregate table.

mod integration;

use clap::{Parser, Subcommand, ValueEnum};
use hearth::data::PropertyDirectory;
use hearth::output::{AggregateSchema, AggregateStore, ExportFormat, Exporter, describe};
use hearth::{BatchAggregator, DEFAULT_CONFIG_FILE, HearthConfig};
use indicatif::{ProgressBar, ProgressStyle};
use integration::cache_manager;
use integration::reference_loader::{FetchOptions, load_reference_cache, refresh_cache};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration as StdDuration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Hearth: property alpha/beta against a market benchmark", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate alpha/beta for properties not yet in the aggregate table
    Run {
        /// Root of the scraped property records
        #[arg(long)]
        property_dir: Option<PathBuf>,

        /// Worker threads
        #[arg(long)]
        concurrency: Option<usize>,

        /// Disable caching (always fetch fresh reference data)
        #[arg(long)]
        no_cache: bool,

        /// Force refresh cached reference data
        #[arg(long)]
        refresh: bool,

        /// Also write the batch report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Download the benchmark and risk-free series into the cache
    Fetch {
        /// Re-download even when the cache covers the window
        #[arg(long)]
        refresh: bool,
    },

    /// Describe the stored aggregate table
    Summary {
        /// Output format
        #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
        format: SummaryFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inspect or clear the reference-series cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show location and contents
    Info,
    /// Delete cached series
    Clear {
        /// Only this series
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Text,
    Csv,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = HearthConfig::load_with_env_and_validate(&cli.config)?;
    tracing::debug!(path = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            property_dir,
            concurrency,
            no_cache,
            refresh,
            report_json,
        } => {
            if let Some(dir) = property_dir {
                config.paths.property_dir = dir;
            }
            if let Some(n) = concurrency {
                config.analysis.concurrency = n;
            }
            config.validate()?;
            let options = FetchOptions {
                use_cache: !no_cache,
                force_refresh: refresh,
            };
            run_batch(&config, options, report_json.as_deref()).await?;
        }
        Commands::Fetch { refresh } => fetch_reference(&config, refresh).await?,
        Commands::Summary { format, output } => summarize(&config, format, output.as_deref())?,
        Commands::Cache { action } => manage_cache(&config, &action)?,
    }

    Ok(())
}

fn store_for(config: &HearthConfig) -> AggregateStore {
    AggregateStore::new(
        config.paths.output_parquet.clone(),
        config.paths.output_csv.clone(),
    )
}

async fn run_batch(
    config: &HearthConfig,
    options: FetchOptions,
    report_json: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nHearth batch run");
    println!(
        "  Benchmark: {} (risk-free {})",
        config.benchmark.market_ticker, config.benchmark.risk_free_ticker
    );
    println!("  Records:   {}", config.paths.property_dir.display());
    if options.use_cache {
        cache_manager::print_cache_info(config.paths.cache_db.as_deref());
        if options.force_refresh {
            println!("  Mode: Force refresh (re-fetching reference data)");
        }
    } else {
        println!("  Cache: Disabled");
    }
    println!();

    let cache = load_reference_cache(config, options).await?;
    if let Some((start, end)) = cache.common_span() {
        println!("  Reference span: {start} to {end}");
    }

    let aggregator = BatchAggregator::new(config.scenario_set()?, config.batch_config());
    let store = store_for(config);
    let existing = store.load(aggregator.schema())?;

    let directory = PropertyDirectory::new(&config.paths.property_dir);
    let total = directory.paths()?.len();
    let records = directory.records()?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(StdDuration::from_millis(100));
    pb.set_message("Estimating...");

    let outcome = aggregator.run_with_progress(records, &cache, existing, |done| {
        pb.set_position(done as u64);
    });
    let outcome = match outcome {
        Ok(outcome) => {
            pb.finish_with_message(format!("Appended {} rows", outcome.report.appended));
            outcome
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };

    store.save(&outcome.result)?;
    println!("  Saved: {}", store.parquet_path().display());
    if let Some(csv) = store.csv_path() {
        println!("  Saved: {}", csv.display());
    }

    print!("{}", outcome.report.to_ascii_table());
    print!("{}", outcome.summary.to_ascii_table());

    if let Some(path) = report_json {
        outcome.report.export_to_file(path, ExportFormat::PrettyJson)?;
        println!("  Report: {}", path.display());
    }

    Ok(())
}

async fn fetch_reference(
    config: &HearthConfig,
    refresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nUpdating reference cache");
    cache_manager::print_cache_info(config.paths.cache_db.as_deref());

    let fetched = refresh_cache(config, refresh).await?;
    for (name, points) in fetched {
        println!("  {name:<12} {points:>8} points");
    }
    Ok(())
}

fn summarize(
    config: &HearthConfig,
    format: SummaryFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = AggregateSchema::from_scenarios(&config.scenario_set()?);
    let store = store_for(config);
    let Some(table) = store.load(&schema)? else {
        return Err(format!(
            "no aggregate table at {}; run `hearth run` first",
            store.parquet_path().display()
        )
        .into());
    };

    let summary = describe(&table);
    let text = match format {
        SummaryFormat::Text => summary.to_ascii_table(),
        SummaryFormat::Csv => summary.export_to_string(ExportFormat::Csv)?,
        SummaryFormat::Json => summary.export_to_string(ExportFormat::PrettyJson)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            println!("Summary written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn manage_cache(
    config: &HearthConfig,
    action: &CacheAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.paths.cache_db.as_deref();
    match action {
        CacheAction::Info => {
            cache_manager::print_cache_info(path);
            for series in cache_manager::cached_series(path)? {
                match (series.first_date(), series.last_date()) {
                    (Some(first), Some(last)) => println!(
                        "    - {:<10} {:>8} points  {first} to {last}",
                        series.name(),
                        series.len()
                    ),
                    _ => println!("    - {}", series.name()),
                }
            }
        }
        CacheAction::Clear { name } => {
            cache_manager::clear(path, name.as_deref())?;
            match name {
                Some(name) => println!("Cleared cached series {name}"),
                None => println!("Cleared reference cache"),
            }
        }
    }
    Ok(())
}
