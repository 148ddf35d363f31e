//! Data models for collected articles and the collections they live in.
//!
//! The store itself is schema-less: every record is a [`Document`]. The typed
//! structs here are what the collectors build before handing records over:
//! - [`Article`]: a search result or alert link, with source-specific extras
//! - [`TalkwalkerAlert`]: a record parsed from a Talkwalker text alert, stored
//!   with the French field names the alert importer has always used
//!
//! [`Collection`] ties a collection name to the source and query mode it holds.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::utils::upcase;

/// A free-form stored record.
pub type Document = Map<String, Value>;

/// Every place articles are collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ieee,
    Wiley,
    Springer,
    Scholar,
    GoogleAlerts,
    Talkwalker,
}

impl SourceKind {
    /// Order in which a full pass visits the sources.
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Ieee,
        SourceKind::Wiley,
        SourceKind::Springer,
        SourceKind::Scholar,
        SourceKind::GoogleAlerts,
        SourceKind::Talkwalker,
    ];

    /// Human readable label, as shown on the dashboard.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Ieee => "IEEE Xplore",
            SourceKind::Wiley => "Wiley Online Library",
            SourceKind::Springer => "Springer",
            SourceKind::Scholar => "Google Scholar",
            SourceKind::GoogleAlerts => "Google Alerts",
            SourceKind::Talkwalker => "Talkwalker",
        }
    }

    /// Prefix of the collection names holding this source.
    pub fn collection_prefix(self) -> &'static str {
        match self {
            SourceKind::Ieee => "ieee",
            SourceKind::Wiley => "wiley",
            SourceKind::Springer => "springer",
            SourceKind::Scholar => "scholar",
            SourceKind::GoogleAlerts => "google_alerts",
            SourceKind::Talkwalker => "talkwalker_alerts",
        }
    }

    /// Sources queried twice, once sorted by relevance and once by recency.
    pub fn has_query_modes(self) -> bool {
        !matches!(self, SourceKind::GoogleAlerts | SourceKind::Talkwalker)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sort order of a search query. Each mode is stored in its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Relevant,
    Newest,
}

impl QueryMode {
    pub const BOTH: [QueryMode; 2] = [QueryMode::Newest, QueryMode::Relevant];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Relevant => "relevant",
            QueryMode::Newest => "newest",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a search query into the topic part of a collection name.
///
/// `"Agriculture 4.0"` becomes `"agriculture_4_0"`.
pub fn topic_slug(query: &str) -> String {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// A named collection, with the source and mode recovered from its name when
/// it follows the `{source}_{topic}[_{mode}]` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub kind: Option<SourceKind>,
    pub mode: Option<QueryMode>,
}

impl Collection {
    pub fn for_source(kind: SourceKind, mode: Option<QueryMode>, topic: &str) -> Self {
        let name = match mode {
            Some(mode) => format!("{}_{}_{}", kind.collection_prefix(), topic, mode),
            None => format!("{}_{}", kind.collection_prefix(), topic),
        };
        Self {
            name,
            kind: Some(kind),
            mode,
        }
    }

    /// Recover source and mode from an existing collection name.
    pub fn parse(name: &str) -> Self {
        let lower = name.to_lowercase();
        let kind = [
            SourceKind::GoogleAlerts,
            SourceKind::Talkwalker,
            SourceKind::Ieee,
            SourceKind::Wiley,
            SourceKind::Springer,
            SourceKind::Scholar,
        ]
        .into_iter()
        .find(|kind| lower.starts_with(kind.collection_prefix()));

        let mode = if lower.ends_with("_newest") {
            Some(QueryMode::Newest)
        } else if lower.ends_with("_relevant") {
            Some(QueryMode::Relevant)
        } else {
            None
        };

        Self {
            name: name.to_string(),
            kind,
            mode,
        }
    }

    /// Collection name with `_` and `.` as spaces, each word capitalised.
    pub fn display_name(&self) -> String {
        self.name
            .replace(['_', '.'], " ")
            .split(' ')
            .map(|word| upcase(&word.to_lowercase()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The dashboard label of the source, or the display name when unknown.
    pub fn source_label(&self) -> String {
        match self.kind {
            Some(kind) => kind.label().to_string(),
            None => self.display_name(),
        }
    }
}

/// A collected article.
///
/// Common fields are typed; anything a single source adds (IEEE conference,
/// Scholar citation count, ...) lives in `extra` and is flattened into the
/// stored document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Source label, e.g. `"IEEE Xplore"`.
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    /// Publication date as displayed by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    /// Insertion day, `YYYY-MM-DD`.
    pub date: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    pub fn new(kind: SourceKind, title: &str, url: &str, date: &str) -> Self {
        Self {
            source: kind.label().to_string(),
            title: title.trim().to_string(),
            url: url.trim().to_string(),
            description: None,
            authors: None,
            published: None,
            date: date.to_string(),
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = non_empty(description);
        self
    }

    pub fn with_authors(mut self, authors: Option<String>) -> Self {
        self.authors = non_empty(authors);
        self
    }

    pub fn with_published(mut self, published: Option<String>) -> Self {
        self.published = non_empty(published);
        self
    }

    /// Attach a source-specific field. `None` values are not stored.
    pub fn with_field(mut self, key: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.extra.insert(key.to_string(), value);
        }
        self
    }

    /// A record is only worth storing with both a title and a link.
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && !self.url.is_empty()
    }

    pub fn into_document(self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Raw pieces of a Talkwalker alert, before cleaning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertMetadata {
    pub original_date: String,
    pub source_raw: String,
}

/// One article parsed out of a Talkwalker text alert.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TalkwalkerAlert {
    pub titre: String,
    /// Alert date, `YYYY-MM-DD`.
    pub date: String,
    pub pays: String,
    /// Root URL of the publishing site, `https://domain`.
    pub lien: String,
    pub metadata: AlertMetadata,
    pub processed_at: DateTime<Utc>,
    pub source: String,
    pub local_import: bool,
}

impl TalkwalkerAlert {
    pub fn into_document(self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }
}
