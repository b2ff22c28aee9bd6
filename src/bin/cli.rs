//! Lifecycle Crawler CLI
//!
//! Local execution entry point: one-shot refreshes, the long-running
//! scheduler, and read-only inspection of committed snapshots.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lifecycle_crawler::{
    config::load_config,
    error::{AppError, Result},
    models::DatasetType,
    pipeline::{self, DatasetQuery, Pagination, RefreshScheduler},
    services::RateLimitedFetcher,
    storage::{DatasetStore, LocalStore},
};

/// Lifecycle Crawler - network-equipment lifecycle datasets
#[derive(Parser, Debug)]
#[command(
    name = "lifecycle-crawler",
    version,
    about = "Crawl and snapshot network-equipment lifecycle data"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one dataset and commit a snapshot
    Refresh {
        /// features, eol, field_notices or products
        #[arg(value_parser = parse_dataset)]
        dataset: DatasetType,
    },

    /// Keep every enabled dataset fresh until Ctrl-C
    Schedule,

    /// Print one page of a committed dataset as JSON
    List {
        /// platforms, releases, features, field_notices or eol
        listing: String,

        /// Filter as key=value (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = pipeline::query::DEFAULT_LIMIT)]
        limit: u32,
    },

    /// Show the latest snapshot and retained history per dataset
    Info,

    /// Validate the configuration file
    Validate,
}

fn parse_dataset(s: &str) -> std::result::Result<DatasetType, String> {
    s.parse().map_err(|e: AppError| e.to_string())
}

fn parse_filter(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return Err(e);
        }
    };

    match cli.command {
        Command::Refresh { dataset } => {
            let store = LocalStore::from_config(&config).await?;
            let fetcher = Arc::new(RateLimitedFetcher::http(config.fetcher.clone())?);
            let job = pipeline::build_job(&config, Arc::clone(&fetcher), dataset)?;
            let meta = pipeline::run_refresh(job.as_ref(), &store).await?;

            let stats = fetcher.stats();
            log::info!(
                "{} v{} committed: {} records, complete={} ({} requests, {} retries, {} rate-limited)",
                dataset,
                meta.version,
                meta.record_count,
                meta.complete,
                stats.dispatched,
                stats.retries,
                stats.rate_limited
            );
        }

        Command::Schedule => {
            let store = Arc::new(LocalStore::from_config(&config).await?);
            let fetcher = Arc::new(RateLimitedFetcher::http(config.fetcher.clone())?);
            let jobs = pipeline::build_jobs(&config, Arc::clone(&fetcher))?;
            if jobs.is_empty() {
                return Err(AppError::config("no dataset is enabled"));
            }

            let scheduler =
                Arc::new(RefreshScheduler::new(store, &config.scheduler).with_jobs(jobs));
            let handle = tokio::spawn(Arc::clone(&scheduler).run());

            tokio::signal::ctrl_c().await?;
            log::info!("Ctrl-C received, shutting down...");
            scheduler.shutdown();
            if let Err(e) = handle.await {
                log::error!("Scheduler task failed: {}", e);
            }

            let stats = fetcher.stats();
            log::info!(
                "Fetcher totals: {} requests, {} retries, {} rate-limited, {} failures",
                stats.dispatched,
                stats.retries,
                stats.rate_limited,
                stats.failures
            );
        }

        Command::List {
            listing,
            filters,
            page,
            limit,
        } => {
            let filters: BTreeMap<String, String> = filters.into_iter().collect();
            let store = LocalStore::from_config(&config).await?;
            let query = DatasetQuery::parse(&listing, &filters)?;
            let pagination = Pagination::new(page, limit)?;
            let page = pipeline::list(&store, &query, pagination).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }

        Command::Info => {
            let store = LocalStore::from_config(&config).await?;
            log::info!("Store directory: {}", config.store.root_dir.display());
            for dataset in DatasetType::ALL {
                match store.read(dataset).await {
                    Ok(Some(snapshot)) => {
                        let meta = &snapshot.meta;
                        log::info!(
                            "{}: v{} at {} ({} records, checksum {}, complete={})",
                            dataset,
                            meta.version,
                            meta.committed_at.to_rfc3339(),
                            meta.record_count,
                            meta.checksum.get(..12).unwrap_or(&meta.checksum),
                            meta.complete
                        );
                        for branch in meta.report.incomplete_branches() {
                            log::info!(
                                "  incomplete: {} ({})",
                                branch.branch,
                                branch.detail.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Ok(None) => log::info!("{}: no snapshot yet", dataset),
                    Err(e) => log::error!("{}: {}", dataset, e),
                }

                let history = store.history(dataset).await?;
                if !history.is_empty() {
                    let versions: Vec<String> = history
                        .iter()
                        .map(|h| {
                            if h.archived {
                                format!("v{} (archived)", h.version)
                            } else {
                                format!("v{}", h.version)
                            }
                        })
                        .collect();
                    log::info!("  history: {}", versions.join(", "));
                }
            }
        }

        Command::Validate => {
            log::info!("✓ Config OK: {}", cli.config.display());
            for dataset in DatasetType::ALL {
                log::info!(
                    "  {}: {} every {:?}, min {} records",
                    dataset,
                    if config.is_enabled(dataset) {
                        "enabled"
                    } else {
                        "disabled"
                    },
                    config.interval(dataset),
                    config.min_records(dataset)
                );
            }
        }
    }

    Ok(())
}
