//! Reconcile the field names of every source into one shape for the dashboard.
//!
//! Academic sources store `title`/`url`, Talkwalker stores `titre`/`lien`/`pays`,
//! and the publication date lives in `published`, `publication_date` or `year`
//! depending on the site.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::models::{Collection, Document, QueryMode, SourceKind};
use crate::utils::domain_of;

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("year pattern is valid"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedArticle {
    pub collection: String,
    pub collection_label: String,
    /// `None` for collections no source adapter writes.
    pub kind: Option<SourceKind>,
    pub source_label: String,
    /// Set for the two-mode sources only.
    pub mode: Option<QueryMode>,
    pub title: String,
    pub url: String,
    pub country: Option<String>,
    pub domain: Option<String>,
    /// Day the record was collected, `YYYY-MM-DD`.
    pub insertion_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
}

fn text_field(document: &Document, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Parse the publication dates the sources display: `2024-03-12`,
/// `12 March 2024`, `March 2024`, `12/03/2024`, or anything holding a year.
pub fn parse_published(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(date) = raw
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d %B %Y") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {raw}"), "%d %B %Y") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(date);
    }
    YEAR.captures(raw)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}

/// Map one stored document to the common shape. Documents without a title or
/// a link are skipped.
pub fn normalize(collection: &str, document: &Document) -> Option<NormalizedArticle> {
    let title = text_field(document, &["title", "titre"])?;
    let url = text_field(document, &["url", "lien"])?;
    let parsed = Collection::parse(collection);

    Some(NormalizedArticle {
        collection: collection.to_string(),
        collection_label: parsed.display_name(),
        source_label: parsed.source_label(),
        kind: parsed.kind,
        mode: parsed.mode,
        domain: domain_of(&url),
        country: text_field(document, &["country", "pays"]),
        insertion_date: text_field(document, &["date"])
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        published_date: text_field(document, &["published", "publication_date", "year"])
            .and_then(|d| parse_published(&d)),
        title,
        url,
    })
}
