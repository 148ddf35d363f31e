//! # agriwatch
//!
//! A daily watch on the scientific and news literature about one topic,
//! "Agriculture 4.0" by default.
//!
//! ## Features
//!
//! - Searches IEEE Xplore, Wiley Online Library and SpringerLink result pages,
//!   sorted both by relevance and by recency (IEEE and Wiley through headless
//!   Chrome when built with `--features js-rendering`)
//! - Queries Google Scholar through SerpAPI
//! - Reads Google Alerts (saved emails and Atom feeds) and Talkwalker text alerts
//! - Stores every source in its own JSON collection with per-source insert policies
//! - Removes records from blacklisted, suspicious or freshly registered domains
//! - Writes a dashboard report as JSON and Markdown
//!
//! ## Usage
//!
//! ```sh
//! agriwatch run
//! agriwatch schedule --at 22:00
//! agriwatch report --output-dir ./reports
//! ```
//!
//! ## Architecture
//!
//! 1. **Collecting**: each source adapter fetches and parses its results
//! 2. **Storing**: the batch goes to the source's collection (replace or skip existing)
//! 3. **Filtering**: the credibility filter checks the day's records by domain
//! 4. **Reporting**: all collections are normalised into one dashboard

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod credibility;
mod dashboard;
mod error;
mod http;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod render;
mod scheduler;
mod sources;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use credibility::CredibilityFilter;
use http::{DefaultFetcher, default_fetcher};
use outputs::{json, markdown};
use pipeline::Pipeline;
use store::{DocumentStore, JsonStore};
use utils::{ensure_writable_dir, today};

/// Configuration file values with command-line overrides applied.
fn effective_config(args: &Cli) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load(&args.config)?;
    if let Some(dir) = &args.store_dir {
        config.store_dir = dir.clone();
    }
    if let Some(query) = &args.query {
        config.query = query.clone();
    }
    if let Some(key) = &args.serpapi_key {
        config.scholar.api_key = Some(key.clone());
    }
    Ok(config)
}

#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
async fn write_report(
    store: &JsonStore,
    output_dir: &Path,
    source: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Report directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let articles = dashboard::load_articles(store).await?;
    let board = dashboard::build(&articles, source);
    let date = Local::now().date_naive();

    let json_path = json::write_dashboard(&board, output_dir, date).await?;
    let md_path = markdown::write_markdown(&board, output_dir, date).await?;
    println!(
        "{} publications, {} domains\n{}\n{}",
        board.total_publications,
        board.unique_domains,
        json_path.display(),
        md_path.display()
    );
    Ok(())
}

async fn list_collections(store: &JsonStore) -> Result<(), Box<dyn Error>> {
    let collections = store.collections().await?;
    if collections.is_empty() {
        println!("No collections in {}", store.dir().display());
    }
    for collection in collections {
        println!("{collection}: {}", store.count(&collection).await?);
    }
    Ok(())
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(
        config = %args.config.display(),
        command = ?args.command,
        "Parsed CLI arguments"
    );

    let config = effective_config(&args)?;
    info!(
        query = %config.query,
        store_dir = %config.store_dir.display(),
        "agriwatch starting up"
    );

    let store = JsonStore::open(&config.store_dir).await?;
    let fetcher: DefaultFetcher = default_fetcher(&config.http)?;
    let pipeline = Pipeline::new(&config, &store, &fetcher);

    match args.command {
        Command::Scrape { sources, mode } => {
            let sources = if sources.is_empty() {
                config.sources.clone()
            } else {
                sources
            };
            let summary = pipeline.scrape(&sources, mode).await;
            print!("{summary}");
        }
        Command::ImportTalkwalker { folder } => {
            let folder = folder.unwrap_or_else(|| config.talkwalker.folder.clone());
            let report = pipeline.import_talkwalker(&folder).await?;
            print!("{report}");
        }
        Command::CheckCredibility { collections, date } => {
            let date = match date {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| error::Error::Config(format!("invalid date {raw:?}: {e}")))?
                    .to_string(),
                None => today(),
            };
            let collections = if collections.is_empty() {
                pipeline.credibility_collections()
            } else {
                collections
            };
            let mut filter = CredibilityFilter::with_whois_client(config.credibility.clone());
            for check in filter.run(&store, &collections, &date).await {
                println!(
                    "{}: {} found, {} checked, {} removed",
                    check.collection, check.found, check.checked, check.removed
                );
            }
        }
        Command::Run => {
            let mut filter = CredibilityFilter::with_whois_client(config.credibility.clone());
            let summary = pipeline.run_all(&mut filter).await;
            print!("{summary}");
        }
        Command::Schedule { at } => {
            let at = scheduler::parse_time(at.as_deref().unwrap_or(&config.schedule_at))?;
            info!(%at, "Daily schedule armed");
            let pipeline = &pipeline;
            let credibility = &config.credibility;
            scheduler::run_daily(at, || async move {
                let mut filter = CredibilityFilter::with_whois_client(credibility.clone());
                let summary = pipeline.run_all(&mut filter).await;
                if !summary.failures.is_empty() {
                    warn!(failures = summary.failures.len(), "Some sources failed");
                }
                print!("{summary}");
            })
            .await?;
        }
        Command::Report { output_dir, source } => {
            write_report(&store, &output_dir, source.as_deref()).await?;
        }
        Command::List => list_collections(&store).await?,
    }

    if let Err(e) = fetcher.inner().close().await {
        warn!(error = %e, "Browser did not shut down cleanly");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
