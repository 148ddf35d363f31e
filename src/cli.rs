//! Command-line interface definitions for agriwatch.
//!
//! Global options override the YAML configuration; the subcommand picks the
//! job to run. API keys can come from the environment.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{QueryMode, SourceKind};

/// Collect, filter and report on publications about one topic.
///
/// # Examples
///
/// ```sh
/// # One daily pass with the default configuration
/// agriwatch run
///
/// # Only the newest IEEE and Springer results
/// agriwatch scrape --source ieee --source springer --mode newest
///
/// # Every day at 22:00
/// agriwatch schedule --at 22:00
///
/// # Dashboard files for today
/// agriwatch report --output-dir ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "agriwatch.yaml")]
    pub config: PathBuf,

    /// Directory of the document store (overrides `store_dir`)
    #[arg(short, long, global = true, env = "AGRIWATCH_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Search query (overrides `query`)
    #[arg(short, long, global = true)]
    pub query: Option<String>,

    /// SerpAPI key for Google Scholar
    #[arg(long, global = true, env = "SERPAPI_KEY", hide_env_values = true)]
    pub serpapi_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run source adapters and store their results
    Scrape {
        /// Sources to run; all configured sources when omitted
        #[arg(long = "source", value_enum)]
        sources: Vec<SourceKind>,

        /// Only run this query mode of two-mode sources
        #[arg(long, value_enum)]
        mode: Option<QueryMode>,
    },

    /// Import a folder of Talkwalker text alerts
    ImportTalkwalker {
        /// Folder of `.txt` alerts (overrides `talkwalker.folder`)
        #[arg(long)]
        folder: Option<PathBuf>,
    },

    /// Remove non-credible records inserted on one day
    CheckCredibility {
        /// Collections to check; the configured set when omitted
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Insertion date `YYYY-MM-DD`, today when omitted
        #[arg(long)]
        date: Option<String>,
    },

    /// One full pass: every source, then the credibility filter
    Run,

    /// Run the full pass every day at a fixed local time
    Schedule {
        /// Local time `HH:MM` (overrides `schedule_at`)
        #[arg(long)]
        at: Option<String>,
    },

    /// Write the dashboard as JSON and Markdown
    Report {
        /// Output directory for the report files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Restrict the article lists to one source label, e.g. "IEEE Xplore"
        #[arg(long)]
        source: Option<String>,
    },

    /// List collections with their document counts
    List,
}
