//! Heuristic credibility filter run after collection.
//!
//! For each checked collection, the records inserted on a given day are
//! checked by URL domain and the non-credible ones are deleted:
//!
//! 1. blacklisted domain (substring match on the host)
//! 2. suspicious top-level domain
//! 3. no WHOIS creation date
//! 4. domain younger than the minimum age
//! 5. WHOIS lookup failure, unless configured to keep such records
//!
//! Verdicts are cached per host for the lifetime of a [`CredibilityFilter`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::CredibilityConfig;
use crate::error::Result;
use crate::models::{Collection, QueryMode, SourceKind};
use crate::store::{DocumentStore, Filter, document_id};
use crate::utils::domain_of;

pub mod whois;

use whois::{WhoisClient, WhoisLookup};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Credible,
    InvalidUrl,
    Blacklisted,
    SuspiciousTld,
    NoCreationDate,
    TooYoung { age_days: i64 },
    LookupFailed { reason: String },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Credible => f.write_str("credible"),
            Verdict::InvalidUrl => f.write_str("invalid url"),
            Verdict::Blacklisted => f.write_str("blacklisted domain"),
            Verdict::SuspiciousTld => f.write_str("suspicious top-level domain"),
            Verdict::NoCreationDate => f.write_str("no creation date"),
            Verdict::TooYoung { age_days } => write!(f, "domain only {age_days} days old"),
            Verdict::LookupFailed { reason } => write!(f, "lookup failed: {reason}"),
        }
    }
}

/// Collections checked when none are configured.
pub fn default_collections(topic: &str) -> Vec<String> {
    vec![
        Collection::for_source(SourceKind::GoogleAlerts, None, topic).name,
        Collection::for_source(SourceKind::Scholar, Some(QueryMode::Newest), topic).name,
        Collection::for_source(SourceKind::Scholar, Some(QueryMode::Relevant), topic).name,
        Collection::for_source(SourceKind::Talkwalker, None, topic).name,
    ]
}

/// Counts for one checked collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionCheck {
    pub collection: String,
    pub found: usize,
    pub checked: usize,
    pub removed: usize,
}

pub struct CredibilityFilter<W> {
    config: CredibilityConfig,
    whois: W,
    cache: HashMap<String, Verdict>,
}

impl CredibilityFilter<WhoisClient> {
    pub fn with_whois_client(config: CredibilityConfig) -> Self {
        let client = WhoisClient::new(
            &config.whois_server,
            Duration::from_secs(config.whois_timeout_secs),
        );
        Self::new(config, client)
    }
}

impl<W: WhoisLookup> CredibilityFilter<W> {
    pub fn new(config: CredibilityConfig, whois: W) -> Self {
        Self {
            config,
            whois,
            cache: HashMap::new(),
        }
    }

    /// Whether a record with this verdict stays in the store.
    pub fn keeps(&self, verdict: &Verdict) -> bool {
        match verdict {
            Verdict::Credible => true,
            Verdict::LookupFailed { .. } => !self.config.remove_on_lookup_failure,
            _ => false,
        }
    }

    /// Judge the domain of a URL as of `now`.
    pub async fn check(&mut self, url: &str, now: DateTime<Utc>) -> Verdict {
        let Some(host) = domain_of(url) else {
            return Verdict::InvalidUrl;
        };

        if self
            .config
            .blacklisted_domains
            .iter()
            .any(|bad| host.contains(bad.as_str()))
        {
            return Verdict::Blacklisted;
        }

        let tld = format!(".{}", host.rsplit('.').next().unwrap_or_default());
        if self.config.suspicious_tlds.iter().any(|s| *s == tld) {
            return Verdict::SuspiciousTld;
        }

        if let Some(verdict) = self.cache.get(&host) {
            debug!(%host, %verdict, "Cached verdict");
            return verdict.clone();
        }
        let verdict = self.domain_age_verdict(&host, now).await;
        self.cache.insert(host, verdict.clone());
        verdict
    }

    async fn domain_age_verdict(&self, host: &str, now: DateTime<Utc>) -> Verdict {
        let name = host.strip_prefix("www.").unwrap_or(host);
        let mut created = self.whois.creation_date(name).await;

        let labels: Vec<&str> = name.split('.').collect();
        if matches!(created, Ok(None)) && labels.len() > 2 {
            let registrable = labels[labels.len() - 2..].join(".");
            debug!(%name, %registrable, "Retrying WHOIS with registrable domain");
            created = self.whois.creation_date(&registrable).await;
        }

        match created {
            Ok(Some(created)) => {
                let age_days = (now - created).num_days();
                if age_days < self.config.min_domain_age_days {
                    Verdict::TooYoung { age_days }
                } else {
                    Verdict::Credible
                }
            }
            Ok(None) => Verdict::NoCreationDate,
            Err(e) => Verdict::LookupFailed {
                reason: e.to_string(),
            },
        }
    }

    /// Check the records of `collection` inserted on `date`, deleting the
    /// non-credible ones.
    #[instrument(level = "info", skip(self, store))]
    pub async fn check_collection<S: DocumentStore>(
        &mut self,
        store: &S,
        collection: &str,
        date: &str,
    ) -> Result<CollectionCheck> {
        let documents = store
            .find(collection, &Filter::all().eq("date", date))
            .await?;
        let mut report = CollectionCheck {
            collection: collection.to_string(),
            found: documents.len(),
            ..CollectionCheck::default()
        };
        info!(found = report.found, "Records to check");

        for document in documents {
            let url = ["url", "lien"]
                .iter()
                .find_map(|key| document.get(*key).and_then(|v| v.as_str()))
                .map(str::trim)
                .filter(|url| !url.is_empty());
            let Some(url) = url else {
                continue;
            };

            let verdict = self.check(url, Utc::now()).await;
            report.checked += 1;
            if !self.keeps(&verdict) {
                match document_id(&document) {
                    Some(id) => {
                        if store.delete_one(collection, id).await? {
                            report.removed += 1;
                            info!(%url, %verdict, "Removed non-credible record");
                        }
                    }
                    None => warn!(%url, "Record without id; cannot remove"),
                }
            }
            self.config.pause.pause().await;
        }

        info!(checked = report.checked, removed = report.removed, "Credibility check done");
        Ok(report)
    }

    /// Check every collection in turn. A failing collection is logged and skipped.
    pub async fn run<S: DocumentStore>(
        &mut self,
        store: &S,
        collections: &[String],
        date: &str,
    ) -> Vec<CollectionCheck> {
        let mut reports = Vec::new();
        for collection in collections {
            match self.check_collection(store, collection, date).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, %collection, "Credibility check failed"),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::Pacing;
    use crate::models::Document;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeWhois {
        created: HashMap<String, DateTime<Utc>>,
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeWhois {
        fn with(mut self, domain: &str, created: DateTime<Utc>) -> Self {
            self.created.insert(domain.to_string(), created);
            self
        }

        fn failing(mut self, domain: &str) -> Self {
            self.failing.push(domain.to_string());
            self
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    impl WhoisLookup for FakeWhois {
        async fn creation_date(&self, domain: &str) -> Result<Option<DateTime<Utc>>> {
            self.queries.lock().unwrap().push(domain.to_string());
            if self.failing.iter().any(|d| d == domain) {
                return Err(Error::Whois("connection refused".to_string()));
            }
            Ok(self.created.get(domain).copied())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()
    }

    fn config() -> CredibilityConfig {
        CredibilityConfig {
            pause: Pacing::none(),
            ..CredibilityConfig::default()
        }
    }

    fn old() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_blacklist_and_tld_skip_whois() {
        let mut filter = CredibilityFilter::new(config(), FakeWhois::default());
        assert_eq!(filter.check("https://www.infowars.com/a", now()).await, Verdict::Blacklisted);
        assert_eq!(filter.check("https://cheap-news.xyz/a", now()).await, Verdict::SuspiciousTld);
        assert_eq!(filter.check("not a url", now()).await, Verdict::InvalidUrl);
        assert_eq!(filter.whois.query_count(), 0);
    }

    #[tokio::test]
    async fn test_domain_age() {
        let whois = FakeWhois::default()
            .with("farmjournal.com", old())
            .with("newfarmnews.com", Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        let mut filter = CredibilityFilter::new(config(), whois);

        assert_eq!(filter.check("https://www.farmjournal.com/x", now()).await, Verdict::Credible);
        assert!(matches!(
            filter.check("https://newfarmnews.com/x", now()).await,
            Verdict::TooYoung { age_days: 66 }
        ));
        assert_eq!(filter.check("https://unknown.org/x", now()).await, Verdict::NoCreationDate);
    }

    #[tokio::test]
    async fn test_subdomain_falls_back_to_registrable_domain() {
        let whois = FakeWhois::default().with("example.com", old());
        let mut filter = CredibilityFilter::new(config(), whois);
        assert_eq!(filter.check("https://news.example.com/a", now()).await, Verdict::Credible);
        assert_eq!(
            *filter.whois.queries.lock().unwrap(),
            vec!["news.example.com".to_string(), "example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_verdicts_are_cached_per_host() {
        let whois = FakeWhois::default().with("agfunder.com", old());
        let mut filter = CredibilityFilter::new(config(), whois);
        filter.check("https://agfunder.com/a", now()).await;
        filter.check("https://agfunder.com/b", now()).await;
        assert_eq!(filter.whois.query_count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_policy() {
        let whois = FakeWhois::default().failing("flaky.com");
        let mut filter = CredibilityFilter::new(config(), whois);
        let verdict = filter.check("https://flaky.com", now()).await;
        assert!(matches!(verdict, Verdict::LookupFailed { .. }));
        assert!(!filter.keeps(&verdict));

        let lenient = CredibilityConfig {
            remove_on_lookup_failure: false,
            ..config()
        };
        let filter = CredibilityFilter::new(lenient, FakeWhois::default());
        assert!(filter.keeps(&verdict));
    }

    #[tokio::test]
    async fn test_check_collection_removes_only_todays_bad_records() {
        let store = MemoryStore::new();
        let docs: Vec<Document> = [
            json!({"title": "good", "url": "https://agfunder.com/a", "date": "2025-05-06"}),
            json!({"title": "bad", "url": "https://theonion.com/a", "date": "2025-05-06"}),
            json!({"title": "old bad", "url": "https://theonion.com/b", "date": "2025-05-05"}),
            json!({"titre": "tw", "lien": "https://fresh.net", "date": "2025-05-06"}),
            json!({"title": "no url", "date": "2025-05-06"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        store.insert_many("google_alerts_x", docs).await.unwrap();

        let whois = FakeWhois::default().with("agfunder.com", old());
        let mut filter = CredibilityFilter::new(config(), whois);
        let report = filter
            .check_collection(&store, "google_alerts_x", "2025-05-06")
            .await
            .unwrap();

        assert_eq!(report.found, 4);
        assert_eq!(report.checked, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(store.count("google_alerts_x").await.unwrap(), 3);
    }

    #[test]
    fn test_default_collections() {
        assert_eq!(
            default_collections("agriculture_4_0"),
            vec![
                "google_alerts_agriculture_4_0",
                "scholar_agriculture_4_0_newest",
                "scholar_agriculture_4_0_relevant",
                "talkwalker_alerts_agriculture_4_0",
            ]
        );
    }
}
