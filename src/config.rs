//! Configuration loaded from a YAML file.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration that reproduces the daily "Agriculture 4.0" watch. Command
//! line flags override the values loaded here (see [`crate::cli`]).
//!
//! ```yaml
//! query: "Agriculture 4.0"
//! store_dir: ./data
//! sources: [ieee, wiley, springer, scholar, google_alerts, talkwalker]
//! schedule_at: "22:00"
//! google_alerts:
//!   inbox_dir: ./alerts/google
//!   feeds: []
//! talkwalker:
//!   folder: ./alerts/talkwalker
//! credibility:
//!   min_domain_age_days: 180
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::http::Pacing;
use crate::models::SourceKind;

/// Browser user agents rotated across requests.
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.6167.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:113.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:113.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 15_4 like Mac OS X) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/15.4 Mobile/15E148 Safari/604.1",
];

const DEFAULT_BLACKLIST: &[&str] = &[
    "infowars.com",
    "naturalnews.com",
    "worldnewsdailyreport.com",
    "beforeitsnews.com",
    "theonion.com",
    "clickhole.com",
    "babylonbee.com",
    "dailybuzzlive.com",
    "empirenews.net",
];

const DEFAULT_SUSPICIOUS_TLDS: &[&str] = &[
    ".xyz", ".top", ".biz", ".click", ".gq", ".info", ".tk", ".cf", ".ml", ".ga",
];

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Search query sent to every search engine.
    pub query: String,
    /// Directory holding one JSON file per collection.
    pub store_dir: PathBuf,
    /// Sources visited by `scrape` and `run`, in this order.
    pub sources: Vec<SourceKind>,
    /// Local time of the daily run, `HH:MM`.
    pub schedule_at: String,
    pub http: HttpConfig,
    pub scholar: ScholarConfig,
    pub google_alerts: GoogleAlertsConfig,
    pub talkwalker: TalkwalkerConfig,
    pub credibility: CredibilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query: "Agriculture 4.0".to_string(),
            store_dir: PathBuf::from("data"),
            sources: SourceKind::ALL.to_vec(),
            schedule_at: "22:00".to_string(),
            http: HttpConfig::default(),
            scholar: ScholarConfig::default(),
            google_alerts: GoogleAlertsConfig::default(),
            talkwalker: TalkwalkerConfig::default(),
            credibility: CredibilityConfig::default(),
        }
    }
}

/// Outbound request behaviour shared by every collector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agents: Vec<String>,
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// Random pause before each search page request.
    pub pause_before: Pacing,
    /// Random pause after each search page has loaded.
    pub pause_after: Pacing,
    /// Longer pause after loading pages of script-heavy sites (IEEE, Wiley).
    pub pause_after_render: Pacing,
    pub render: RenderConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 15,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            pause_before: Pacing::new(2000, 5000),
            pause_after: Pacing::new(1000, 3000),
            pause_after_render: Pacing::new(3000, 6000),
            render: RenderConfig::default(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Headless Chrome used for result pages built by JavaScript (IEEE, Wiley).
///
/// Only effective in builds with the `js-rendering` feature; other builds
/// fetch those pages over plain HTTP.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub enabled: bool,
    pub headless: bool,
    /// Disable for containers where Chrome cannot sandbox itself.
    pub sandbox: bool,
    pub page_load_timeout_secs: u64,
    /// How long to wait for the result list to appear.
    pub selector_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            sandbox: true,
            page_load_timeout_secs: 30,
            selector_timeout_secs: 20,
        }
    }
}

impl RenderConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScholarConfig {
    pub endpoint: String,
    /// Usually provided through `SERPAPI_KEY` rather than the file.
    pub api_key: Option<String>,
    pub results: u32,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://serpapi.com/search".to_string(),
            api_key: None,
            results: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GoogleAlertsConfig {
    /// Folder of alert emails saved as HTML.
    pub inbox_dir: PathBuf,
    /// Atom feed URLs of alerts delivered as feeds.
    pub feeds: Vec<String>,
}

impl Default for GoogleAlertsConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("alerts/google"),
            feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TalkwalkerConfig {
    /// Folder of Talkwalker alerts saved as text files.
    pub folder: PathBuf,
}

impl Default for TalkwalkerConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("alerts/talkwalker"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredibilityConfig {
    /// Collections checked. Empty means the default set derived from the query.
    pub collections: Vec<String>,
    pub blacklisted_domains: Vec<String>,
    pub suspicious_tlds: Vec<String>,
    pub min_domain_age_days: i64,
    /// Delete a record when its WHOIS lookup fails.
    pub remove_on_lookup_failure: bool,
    pub whois_server: String,
    pub whois_timeout_secs: u64,
    /// Random pause after each checked record.
    pub pause: Pacing,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            blacklisted_domains: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            suspicious_tlds: DEFAULT_SUSPICIOUS_TLDS.iter().map(|s| s.to_string()).collect(),
            min_domain_age_days: 180,
            remove_on_lookup_failure: true,
            whois_server: "whois.iana.org".to_string(),
            whois_timeout_secs: 15,
            pause: Pacing::new(1000, 2000),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration file; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::Config("query must not be empty".to_string()));
        }
        if self.http.user_agents.is_empty() {
            return Err(Error::Config("http.user_agents must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.query, "Agriculture 4.0");
        assert_eq!(config.sources.len(), 6);
        assert_eq!(config.credibility.min_domain_age_days, 180);
        assert_eq!(config.http.timeout_secs, 15);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
query: "Smart Farming"
sources: [springer, talkwalker]
credibility:
  min_domain_age_days: 365
  remove_on_lookup_failure: false
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.query, "Smart Farming");
        assert_eq!(config.sources, vec![SourceKind::Springer, SourceKind::Talkwalker]);
        assert_eq!(config.credibility.min_domain_age_days, 365);
        assert!(!config.credibility.remove_on_lookup_failure);
        assert_eq!(config.credibility.blacklisted_domains.len(), 9);
        assert_eq!(config.schedule_at, "22:00");
    }

    #[test]
    fn test_empty_query_is_rejected() {
        assert!(Config::from_yaml("query: \"  \"").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.schedule_at, "22:00");
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = Config::from_yaml(include_str!("../agriwatch.example.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.sources, defaults.sources);
        assert_eq!(config.http.pause_after_render, defaults.http.pause_after_render);
        assert_eq!(config.http.render, defaults.http.render);
        assert_eq!(config.credibility.pause, defaults.credibility.pause);
        assert_eq!(config.store_dir, PathBuf::from("./data"));
    }
}
