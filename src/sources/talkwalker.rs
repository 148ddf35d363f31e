//! Talkwalker alert import.
//!
//! Talkwalker alert emails are saved as text files in a folder. Each article
//! appears as a title followed by a line such as
//!
//! ```text
//! Smart farming robots reach European fields
//! 12/05/25 14:30 | France | https://www.example.fr/robots?utm_source=tw
//! ```
//!
//! The title block of the first article of a mail also carries the mail
//! header (`[Talkwalker Alerts]`, `Sujet :`, `De :`...), which is cleaned away.
//! Records are stored with the field names `titre`, `date`, `pays` and `lien`,
//! `lien` being the root URL of the publishing site.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::{InsertPolicy, Source};
use crate::error::{Error, Result};
use crate::http::Fetch;
use crate::models::{AlertMetadata, Document, QueryMode, SourceKind, TalkwalkerAlert};
use crate::utils::{collapse_whitespace, truncate_chars};

static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?sm)(?P<title>.+?)\n",
        r"(?P<date>\d{2}/\d{2}/\d{2},? \d{2}:\d{2})\s?[|,]\s?",
        r"(?P<country>.+?)\s?[|,]\s?",
        r"(?P<source>.+?)(?:\n|$)",
    ))
    .expect("record pattern is valid")
});

static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\[Talkwalker Alerts\]").expect("header pattern is valid"));

static MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(Sujet :|De :|Date :|Pour :|Tell a Friend|Latest News from our blog)")
        .expect("marker pattern is valid")
});

static ICON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bIcon\b").expect("icon pattern is valid"));

static TRACKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([?&])(utm_[^=&]+=[^&]*|fbclid=[^&]*)").expect("tracking pattern is valid")
});

const TITLE_MAX_CHARS: usize = 300;

/// Strip mail header lines, trailing mail chrome and `Icon` artefacts from a title block.
pub fn clean_title(raw: &str) -> String {
    let kept = raw
        .lines()
        .filter(|line| !HEADER.is_match(line))
        .map(|line| {
            let line = match MARKERS.find(line) {
                Some(m) => &line[..m.start()],
                None => line,
            };
            let line = ICON.replace_all(line, " ");
            match line.find("...") {
                Some(pos) => line[..pos].to_string(),
                None => line.into_owned(),
            }
        })
        .join(" ");
    truncate_chars(&collapse_whitespace(&kept), TITLE_MAX_CHARS)
}

/// `dd/mm/yy HH:MM`, with an optional comma after the year, to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let cleaned = raw.replace(',', "");
    NaiveDateTime::parse_from_str(cleaned.trim(), "%d/%m/%y %H:%M")
        .ok()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Reduce a source link to `https://<domain>`, dropping tracking parameters,
/// scheme and a leading `www.`.
pub fn site_root(raw: &str) -> Option<String> {
    let without_tracking = TRACKING.replace_all(raw, "$1");
    let lower = without_tracking.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let domain = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    if domain.is_empty() || domain.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("https://{domain}"))
}

/// Extract every valid alert from the text of one saved alert email.
pub fn parse_alerts(content: &str, processed_at: DateTime<Utc>) -> Vec<TalkwalkerAlert> {
    RECORD
        .captures_iter(content)
        .filter_map(|caps| {
            let raw_date = caps.name("date")?.as_str();
            let raw_source = caps.name("source")?.as_str().trim();
            let titre = clean_title(caps.name("title")?.as_str());
            let pays = caps.name("country")?.as_str().trim().to_string();

            let (Some(date), Some(lien)) = (normalize_date(raw_date), site_root(raw_source)) else {
                debug!(raw_date, raw_source, "Dropping Talkwalker block with bad date or link");
                return None;
            };
            if titre.is_empty() || pays.is_empty() {
                debug!(raw_date, "Dropping Talkwalker block without title or country");
                return None;
            }

            Some(TalkwalkerAlert {
                titre,
                date,
                pays,
                lien,
                metadata: AlertMetadata {
                    original_date: raw_date.to_string(),
                    source_raw: raw_source.to_string(),
                },
                processed_at,
                source: SourceKind::Talkwalker.label().to_string(),
                local_import: true,
            })
        })
        .collect()
}

/// `*.txt` and `*.TXT` files of a folder, sorted by name.
pub async fn alert_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !fs::try_exists(folder).await? {
        return Err(Error::FolderNotFound(folder.display().to_string()));
    }
    let mut files = Vec::new();
    let mut entries = fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "txt" || ext == "TXT");
        if is_txt && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// What reading the alert folder produced.
#[derive(Debug, Default)]
pub struct FolderImport {
    pub files: usize,
    pub alerts: Vec<TalkwalkerAlert>,
}

#[derive(Debug, Clone)]
pub struct TalkwalkerSource {
    folder: PathBuf,
}

impl TalkwalkerSource {
    pub fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
        }
    }

    /// Parse every alert file of the folder. Unreadable or empty files are skipped.
    #[instrument(level = "info", skip_all, fields(folder = %self.folder.display()))]
    pub async fn read_folder(&self) -> Result<FolderImport> {
        let files = alert_files(&self.folder).await?;
        if files.is_empty() {
            warn!("No Talkwalker text files found");
        }

        let processed_at = Utc::now();
        let mut import = FolderImport {
            files: files.len(),
            alerts: Vec::new(),
        };
        for path in &files {
            let bytes = match fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Could not read alert file");
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes);
            if content.trim().is_empty() {
                warn!(path = %path.display(), "Empty alert file");
                continue;
            }
            let alerts = parse_alerts(&content, processed_at);
            info!(path = %path.display(), count = alerts.len(), "Parsed Talkwalker alert file");
            import.alerts.extend(alerts);
        }
        Ok(import)
    }
}

impl Source for TalkwalkerSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Talkwalker
    }

    fn insert_policy(&self, _mode: Option<QueryMode>) -> InsertPolicy {
        InsertPolicy::SkipExisting(&["lien"])
    }

    fn unique_field(&self) -> Option<&'static str> {
        Some("lien")
    }

    async fn collect<F: Fetch>(
        &self,
        _fetcher: &F,
        _mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let import = self.read_folder().await?;
        Ok(import
            .alerts
            .into_iter()
            .map(TalkwalkerAlert::into_document)
            .collect())
    }
}

/// Figures printed after an import that inserted something.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportStats {
    pub total: usize,
    pub imported_last_hour: usize,
    pub top_countries: Vec<(String, usize)>,
    /// Documents per alert date over the last 7 days, newest first.
    pub recent: Vec<(String, usize)>,
}

impl ImportStats {
    pub fn compute(documents: &[Document], now: DateTime<Utc>) -> Self {
        let hour_ago = now - Duration::hours(1);
        let imported_last_hour = documents
            .iter()
            .filter(|doc| doc.get("local_import").and_then(|v| v.as_bool()) == Some(true))
            .filter_map(|doc| doc.get("processed_at").and_then(|v| v.as_str()))
            .filter_map(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .filter(|ts| ts.with_timezone(&Utc) >= hour_ago)
            .count();

        let mut countries: HashMap<String, usize> = HashMap::new();
        for country in documents
            .iter()
            .filter_map(|doc| doc.get("pays").and_then(|v| v.as_str()))
        {
            *countries.entry(country.to_string()).or_default() += 1;
        }
        let top_countries = countries
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(5)
            .collect();

        let week_ago = (now - Duration::days(7)).format("%Y-%m-%d").to_string();
        let recent = documents
            .iter()
            .filter_map(|doc| doc.get("date").and_then(|v| v.as_str()))
            .filter(|date| *date >= week_ago.as_str())
            .counts()
            .into_iter()
            .map(|(date, count)| (date.to_string(), count))
            .sorted_by(|a, b| b.0.cmp(&a.0))
            .take(7)
            .collect();

        Self {
            total: documents.len(),
            imported_last_hour,
            top_countries,
            recent,
        }
    }
}

/// Outcome of `import-talkwalker`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub collection: String,
    pub files: usize,
    pub valid: usize,
    pub inserted: usize,
    pub stats: Option<ImportStats>,
}

impl ImportReport {
    /// Share of valid articles that were new, in percent.
    pub fn novelty_rate(&self) -> Option<f64> {
        (self.valid > 0).then(|| self.inserted as f64 / self.valid as f64 * 100.0)
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Talkwalker import into {}", self.collection)?;
        writeln!(f, "- Files processed: {}", self.files)?;
        writeln!(f, "- Valid articles: {}", self.valid)?;
        writeln!(f, "- New articles inserted: {}", self.inserted)?;
        if self.inserted > 0 {
            if let Some(rate) = self.novelty_rate() {
                writeln!(f, "- Novelty rate: {rate:.1}%")?;
            }
        }
        if let Some(stats) = &self.stats {
            writeln!(f)?;
            writeln!(f, "Collection statistics")?;
            writeln!(f, "- Total documents: {}", stats.total)?;
            writeln!(f, "- Imported during the last hour: {}", stats.imported_last_hour)?;
            writeln!(f, "Top 5 countries:")?;
            for (country, count) in &stats.top_countries {
                writeln!(f, "  - {country}: {count}")?;
            }
            writeln!(f, "Last 7 days:")?;
            for (date, count) in &stats.recent {
                writeln!(f, "  - {date}: {count}")?;
            }
        }
        Ok(())
    }
}
