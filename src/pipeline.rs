//! Collection pipeline: run adapters, apply insert policies, check credibility.
//!
//! Sources are visited one after another, in the order IEEE, Wiley, Springer,
//! Google Scholar, Google Alerts, Talkwalker. A failing source or mode is
//! logged and recorded in the [`RunSummary`]; it never stops the pass.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::credibility::whois::WhoisLookup;
use crate::credibility::{CollectionCheck, CredibilityFilter, default_collections};
use crate::error::Result;
use crate::http::Fetch;
use crate::models::{Collection, Document, QueryMode, SourceKind, TalkwalkerAlert, topic_slug};
use crate::sources::talkwalker::{ImportReport, ImportStats, TalkwalkerSource};
use crate::sources::{Adapter, InsertPolicy, Source, TITLE_AND_URL};
use crate::store::{DocumentStore, Filter};
use crate::utils::today;

/// Outcome of one adapter run for one mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub fetched: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub mode: Option<QueryMode>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub ingested: Vec<IngestReport>,
    pub failures: Vec<SourceFailure>,
    pub credibility: Vec<CollectionCheck>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.ingested {
            writeln!(
                f,
                "{}: {} fetched, {} inserted",
                report.collection, report.fetched, report.inserted
            )?;
        }
        for failure in &self.failures {
            match failure.mode {
                Some(mode) => writeln!(f, "{} ({mode}) failed: {}", failure.source, failure.error)?,
                None => writeln!(f, "{} failed: {}", failure.source, failure.error)?,
            }
        }
        for check in &self.credibility {
            writeln!(
                f,
                "{}: {} checked, {} removed as not credible",
                check.collection, check.checked, check.removed
            )?;
        }
        Ok(())
    }
}

/// Identity of a document under the given key fields.
fn key_of(document: &Document, keys: &[&str]) -> String {
    let values: Vec<&Value> = keys
        .iter()
        .map(|key| document.get(*key).unwrap_or(&Value::Null))
        .collect();
    serde_json::to_string(&values).unwrap_or_default()
}

/// Write a batch according to `policy`. Returns how many documents were inserted.
pub async fn store_batch<S: DocumentStore>(
    store: &S,
    collection: &str,
    policy: InsertPolicy,
    documents: Vec<Document>,
) -> Result<usize> {
    match policy {
        InsertPolicy::Replace => {
            if documents.is_empty() {
                warn!(collection, "Empty batch; keeping previous content");
                return Ok(0);
            }
            let mut seen = HashSet::new();
            let batch: Vec<Document> = documents
                .into_iter()
                .filter(|doc| seen.insert(key_of(doc, TITLE_AND_URL)))
                .collect();
            info!(collection, batch = batch.len(), "Replacing collection content");
            store.replace_all(collection, batch).await
        }
        InsertPolicy::SkipExisting(keys) => {
            let mut seen: HashSet<String> = store
                .find(collection, &Filter::all())
                .await?
                .iter()
                .map(|doc| key_of(doc, keys))
                .collect();
            let batch: Vec<Document> = documents
                .into_iter()
                .filter(|doc| seen.insert(key_of(doc, keys)))
                .collect();
            store.insert_many(collection, batch).await
        }
    }
}

pub struct Pipeline<'a, S, F> {
    config: &'a Config,
    store: &'a S,
    fetcher: &'a F,
}

impl<'a, S: DocumentStore, F: Fetch> Pipeline<'a, S, F> {
    pub fn new(config: &'a Config, store: &'a S, fetcher: &'a F) -> Self {
        Self {
            config,
            store,
            fetcher,
        }
    }

    pub fn topic(&self) -> String {
        topic_slug(&self.config.query)
    }

    /// Collect one adapter in one mode and store the batch.
    #[instrument(level = "info", skip(self, adapter), fields(source = %adapter.kind()))]
    pub async fn ingest(&self, adapter: &Adapter, mode: Option<QueryMode>) -> Result<IngestReport> {
        let collection = Collection::for_source(adapter.kind(), mode, &self.topic()).name;
        if let Some(field) = adapter.unique_field() {
            self.store.ensure_unique(&collection, field).await?;
        }

        let documents = adapter.collect(self.fetcher, mode).await?;
        let fetched = documents.len();
        let inserted =
            store_batch(self.store, &collection, adapter.insert_policy(mode), documents).await?;

        info!(%collection, fetched, inserted, "Stored batch");
        Ok(IngestReport {
            collection,
            fetched,
            inserted,
        })
    }

    /// Run the given sources, optionally restricted to one query mode.
    pub async fn scrape(&self, sources: &[SourceKind], only_mode: Option<QueryMode>) -> RunSummary {
        let mut summary = RunSummary::default();
        for kind in SourceKind::ALL.into_iter().filter(|k| sources.contains(k)) {
            let adapter = Adapter::new(kind, self.config);
            let modes = adapter
                .modes()
                .into_iter()
                .filter(|mode| only_mode.is_none() || mode.is_none() || *mode == only_mode);
            for mode in modes {
                match self.ingest(&adapter, mode).await {
                    Ok(report) => summary.ingested.push(report),
                    Err(e) => {
                        error!(source = %kind, ?mode, error = %e, "Source failed");
                        summary.failures.push(SourceFailure {
                            source: kind,
                            mode,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        summary
    }

    /// Collections the credibility filter checks by default.
    pub fn credibility_collections(&self) -> Vec<String> {
        if self.config.credibility.collections.is_empty() {
            default_collections(&self.topic())
        } else {
            self.config.credibility.collections.clone()
        }
    }

    /// One full daily pass: every enabled source, then the credibility filter
    /// over today's records.
    #[instrument(level = "info", skip_all)]
    pub async fn run_all<W: WhoisLookup>(&self, filter: &mut CredibilityFilter<W>) -> RunSummary {
        let t0 = Instant::now();
        let mut summary = self.scrape(&self.config.sources, None).await;
        summary.credibility = filter
            .run(self.store, &self.credibility_collections(), &today())
            .await;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            ingested = summary.ingested.len(),
            failures = summary.failures.len(),
            "Daily pass finished"
        );
        summary
    }

    /// Import a folder of Talkwalker alerts and report on the collection.
    #[instrument(level = "info", skip(self))]
    pub async fn import_talkwalker(&self, folder: &Path) -> Result<ImportReport> {
        let source = TalkwalkerSource::new(folder);
        let collection = Collection::for_source(SourceKind::Talkwalker, None, &self.topic()).name;
        self.store.ensure_unique(&collection, "lien").await?;

        let import = source.read_folder().await?;
        let valid = import.alerts.len();
        let documents = import
            .alerts
            .into_iter()
            .map(TalkwalkerAlert::into_document)
            .collect();
        let inserted =
            store_batch(self.store, &collection, source.insert_policy(None), documents).await?;

        let stats = if inserted > 0 {
            let all = self.store.find(&collection, &Filter::all()).await?;
            Some(ImportStats::compute(&all, Utc::now()))
        } else {
            None
        };

        info!(files = import.files, valid, inserted, "Talkwalker import finished");
        Ok(ImportReport {
            collection,
            files: import.files,
            valid,
            inserted,
            stats,
        })
    }
}
