//! Source adapters turning search pages, API answers and saved alerts into documents.
//!
//! Every adapter splits its work in two:
//!
//! 1. **Fetching**: load the raw page, API answer or alert files
//! 2. **Parsing**: a pure function from the raw text to [`Article`]s, tested
//!    against fixtures
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | IEEE Xplore | [`ieee`] | HTML scraping | Newest and relevant result lists |
//! | Wiley Online Library | [`wiley`] | HTML scraping | Earliest and relevancy sort orders |
//! | SpringerLink | [`springer`] | HTML scraping | Articles and research content only |
//! | Google Scholar | [`scholar`] | SerpAPI JSON | Requires an API key |
//! | Google Alerts | [`google_alerts`] | Saved emails, Atom feeds | No mail provider plumbing |
//! | Talkwalker | [`talkwalker`] | Saved text alerts | Own field names, unique `lien` |
//!
//! [`Adapter`] dispatches over the concrete adapters so the pipeline can hold
//! any of them without trait objects.
//!
//! [`Article`]: crate::models::Article

use scraper::{ElementRef, Selector};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::Fetch;
use crate::models::{Document, QueryMode, SourceKind};
use crate::utils::collapse_whitespace;

pub mod google_alerts;
pub mod ieee;
pub mod scholar;
pub mod springer;
pub mod talkwalker;
pub mod wiley;

use google_alerts::GoogleAlertsSource;
use ieee::IeeeSource;
use scholar::ScholarSource;
use springer::SpringerSource;
use talkwalker::TalkwalkerSource;
use wiley::WileySource;

/// How a collected batch is written to its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Insert only documents whose values for these fields match no stored document.
    SkipExisting(&'static [&'static str]),
    /// Drop the collection content and store the new batch, unless the batch is empty.
    Replace,
}

pub const TITLE_AND_URL: &[&str] = &["title", "url"];

pub trait Source {
    fn kind(&self) -> SourceKind;

    /// Query modes to run. `None` is the single stream of alert sources.
    fn modes(&self) -> Vec<Option<QueryMode>> {
        if self.kind().has_query_modes() {
            QueryMode::BOTH.into_iter().map(Some).collect()
        } else {
            vec![None]
        }
    }

    fn insert_policy(&self, mode: Option<QueryMode>) -> InsertPolicy;

    /// Field the collection declares unique, if any.
    fn unique_field(&self) -> Option<&'static str> {
        None
    }

    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>>;
}

/// Holds any of the supported source adapters.
#[derive(Debug, Clone)]
pub enum Adapter {
    Ieee(IeeeSource),
    Wiley(WileySource),
    Springer(SpringerSource),
    Scholar(ScholarSource),
    GoogleAlerts(GoogleAlertsSource),
    Talkwalker(TalkwalkerSource),
}

impl Adapter {
    pub fn new(kind: SourceKind, config: &Config) -> Self {
        match kind {
            SourceKind::Ieee => Adapter::Ieee(IeeeSource::new(&config.query, &config.http)),
            SourceKind::Wiley => Adapter::Wiley(WileySource::new(&config.query, &config.http)),
            SourceKind::Springer => {
                Adapter::Springer(SpringerSource::new(&config.query, &config.http))
            }
            SourceKind::Scholar => Adapter::Scholar(ScholarSource::new(
                &config.query,
                &config.scholar,
                &config.http,
            )),
            SourceKind::GoogleAlerts => {
                Adapter::GoogleAlerts(GoogleAlertsSource::new(&config.google_alerts))
            }
            SourceKind::Talkwalker => {
                Adapter::Talkwalker(TalkwalkerSource::new(&config.talkwalker.folder))
            }
        }
    }
}

impl Source for Adapter {
    fn kind(&self) -> SourceKind {
        match self {
            Adapter::Ieee(s) => s.kind(),
            Adapter::Wiley(s) => s.kind(),
            Adapter::Springer(s) => s.kind(),
            Adapter::Scholar(s) => s.kind(),
            Adapter::GoogleAlerts(s) => s.kind(),
            Adapter::Talkwalker(s) => s.kind(),
        }
    }

    fn modes(&self) -> Vec<Option<QueryMode>> {
        match self {
            Adapter::Ieee(s) => s.modes(),
            Adapter::Wiley(s) => s.modes(),
            Adapter::Springer(s) => s.modes(),
            Adapter::Scholar(s) => s.modes(),
            Adapter::GoogleAlerts(s) => s.modes(),
            Adapter::Talkwalker(s) => s.modes(),
        }
    }

    fn insert_policy(&self, mode: Option<QueryMode>) -> InsertPolicy {
        match self {
            Adapter::Ieee(s) => s.insert_policy(mode),
            Adapter::Wiley(s) => s.insert_policy(mode),
            Adapter::Springer(s) => s.insert_policy(mode),
            Adapter::Scholar(s) => s.insert_policy(mode),
            Adapter::GoogleAlerts(s) => s.insert_policy(mode),
            Adapter::Talkwalker(s) => s.insert_policy(mode),
        }
    }

    fn unique_field(&self) -> Option<&'static str> {
        match self {
            Adapter::Ieee(s) => s.unique_field(),
            Adapter::Wiley(s) => s.unique_field(),
            Adapter::Springer(s) => s.unique_field(),
            Adapter::Scholar(s) => s.unique_field(),
            Adapter::GoogleAlerts(s) => s.unique_field(),
            Adapter::Talkwalker(s) => s.unique_field(),
        }
    }

    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        match self {
            Adapter::Ieee(s) => s.collect(fetcher, mode).await,
            Adapter::Wiley(s) => s.collect(fetcher, mode).await,
            Adapter::Springer(s) => s.collect(fetcher, mode).await,
            Adapter::Scholar(s) => s.collect(fetcher, mode).await,
            Adapter::GoogleAlerts(s) => s.collect(fetcher, mode).await,
            Adapter::Talkwalker(s) => s.collect(fetcher, mode).await,
        }
    }
}

/// Common helpers for the HTML adapters.
pub(crate) mod html {
    use super::*;

    pub fn selector(css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| Error::Selector {
            selector: css.to_string(),
            reason: e.to_string(),
        })
    }

    /// Visible text of an element with whitespace collapsed.
    pub fn text_of(element: ElementRef<'_>) -> String {
        collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
    }

    /// Text of the first descendant matching `selector`, if non-empty.
    pub fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
        item.select(selector)
            .next()
            .map(text_of)
            .filter(|text| !text.is_empty())
    }
}

/// The mode a two-mode source was asked for; single-stream calls default to newest.
pub(crate) fn mode_or_newest(mode: Option<QueryMode>) -> QueryMode {
    mode.unwrap_or(QueryMode::Newest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_policies_per_source() {
        let config = Config::default();
        let policy = |kind, mode| Adapter::new(kind, &config).insert_policy(mode);

        assert_eq!(policy(SourceKind::Ieee, Some(QueryMode::Relevant)), InsertPolicy::Replace);
        assert_eq!(
            policy(SourceKind::Ieee, Some(QueryMode::Newest)),
            InsertPolicy::SkipExisting(TITLE_AND_URL)
        );
        assert_eq!(
            policy(SourceKind::Wiley, Some(QueryMode::Relevant)),
            InsertPolicy::SkipExisting(TITLE_AND_URL)
        );
        assert_eq!(
            policy(SourceKind::Springer, Some(QueryMode::Relevant)),
            InsertPolicy::SkipExisting(TITLE_AND_URL)
        );
        assert_eq!(policy(SourceKind::Scholar, Some(QueryMode::Relevant)), InsertPolicy::Replace);
        assert_eq!(
            policy(SourceKind::Scholar, Some(QueryMode::Newest)),
            InsertPolicy::SkipExisting(&["title"])
        );
        assert_eq!(
            policy(SourceKind::GoogleAlerts, None),
            InsertPolicy::SkipExisting(TITLE_AND_URL)
        );
        assert_eq!(policy(SourceKind::Talkwalker, None), InsertPolicy::SkipExisting(&["lien"]));
    }

    #[test]
    fn test_modes_and_unique_fields() {
        let config = Config::default();
        let ieee = Adapter::new(SourceKind::Ieee, &config);
        assert_eq!(ieee.modes(), vec![Some(QueryMode::Newest), Some(QueryMode::Relevant)]);
        assert_eq!(ieee.unique_field(), None);

        let talkwalker = Adapter::new(SourceKind::Talkwalker, &config);
        assert_eq!(talkwalker.modes(), vec![None]);
        assert_eq!(talkwalker.unique_field(), Some("lien"));
        assert_eq!(talkwalker.kind(), SourceKind::Talkwalker);
    }

    #[test]
    fn test_bad_selector_is_reported() {
        assert!(matches!(html::selector("li[[["), Err(Error::Selector { .. })));
    }
}
