//! Google Scholar results through the SerpAPI JSON endpoint.
//!
//! Relevance and recency are selected with `scisbd` (`0` and `2`). The API key
//! comes from the configuration or `SERPAPI_KEY`; without one the source fails
//! before any request is made.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{InsertPolicy, Source, mode_or_newest};
use crate::config::{HttpConfig, ScholarConfig};
use crate::error::{Error, Result};
use crate::http::{Fetch, Pacing, with_query};
use crate::models::{Article, Document, QueryMode, SourceKind};
use crate::utils::{today, truncate_for_log};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic_results: Option<Vec<OrganicResult>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub publication_info: Option<PublicationInfo>,
    #[serde(default)]
    pub inline_links: Option<InlineLinks>,
}

#[derive(Debug, Deserialize)]
pub struct PublicationInfo {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InlineLinks {
    #[serde(default)]
    pub cited_by: Option<CitedBy>,
    #[serde(default)]
    pub cached_page_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CitedBy {
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ScholarSource {
    query: String,
    endpoint: String,
    api_key: Option<String>,
    results: u32,
    pause_before: Pacing,
    pause_after: Pacing,
}

impl ScholarSource {
    pub fn new(query: &str, scholar: &ScholarConfig, http: &HttpConfig) -> Self {
        Self {
            query: query.to_string(),
            endpoint: scholar.endpoint.clone(),
            api_key: scholar.api_key.clone().filter(|key| !key.trim().is_empty()),
            results: scholar.results,
            pause_before: http.pause_before,
            pause_after: http.pause_after,
        }
    }

    #[cfg(test)]
    pub fn with_pacing(mut self, before: Pacing, after: Pacing) -> Self {
        self.pause_before = before;
        self.pause_after = after;
        self
    }

    fn request_url(&self, api_key: &str, mode: QueryMode) -> String {
        let num = self.results.to_string();
        with_query(
            &self.endpoint,
            &[
                ("engine", "google_scholar"),
                ("q", &self.query),
                ("hl", "en"),
                ("num", &num),
                ("api_key", api_key),
                ("scisbd", scisbd(mode)),
            ],
        )
    }
}

/// SerpAPI sort switch: `0` sorts by relevance, `2` by date.
pub fn scisbd(mode: QueryMode) -> &'static str {
    match mode {
        QueryMode::Relevant => "0",
        QueryMode::Newest => "2",
    }
}

fn search_mode(mode: QueryMode) -> &'static str {
    match mode {
        QueryMode::Relevant => "relevance",
        QueryMode::Newest => "newest",
    }
}

/// Turn a SerpAPI answer into articles. An answer without `organic_results`
/// yields no articles.
pub fn parse_response(body: &str, mode: QueryMode, date: &str) -> Result<Vec<Article>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    if let Some(error) = &response.error {
        warn!(%error, "SerpAPI reported an error");
    }
    let Some(results) = response.organic_results else {
        warn!(mode = search_mode(mode), "No Google Scholar results");
        return Ok(Vec::new());
    };

    Ok(results
        .into_iter()
        .filter_map(|result| {
            let (cited_by, cached_link) = match result.inline_links {
                Some(links) => (links.cited_by.and_then(|c| c.total), links.cached_page_link),
                None => (None, None),
            };
            let article = Article::new(
                SourceKind::Scholar,
                result.title.as_deref().unwrap_or_default(),
                result.link.as_deref().unwrap_or_default(),
                date,
            )
            .with_description(result.snippet)
            .with_field(
                "publication_info",
                result
                    .publication_info
                    .and_then(|info| info.summary)
                    .map(Value::from),
            )
            .with_field("citations", cited_by.map(Value::from))
            .with_field("cached_link", cached_link.map(Value::from))
            .with_field("search_mode", Some(Value::from(search_mode(mode))));
            article.is_complete().then_some(article)
        })
        .collect())
}

impl Source for ScholarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Scholar
    }

    fn insert_policy(&self, mode: Option<QueryMode>) -> InsertPolicy {
        match mode_or_newest(mode) {
            QueryMode::Relevant => InsertPolicy::Replace,
            QueryMode::Newest => InsertPolicy::SkipExisting(&["title"]),
        }
    }

    #[instrument(level = "info", skip_all, fields(source = "scholar", ?mode))]
    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(Error::MissingApiKey("Google Scholar (SERPAPI_KEY)"))?;
        let mode = mode_or_newest(mode);

        self.pause_before.pause().await;
        let body = fetcher.get(&self.request_url(api_key, mode)).await?;
        self.pause_after.pause().await;

        let articles = parse_response(&body, mode, &today()).inspect_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&body, 300),
                "Unusable SerpAPI answer"
            );
        })?;
        info!(count = articles.len(), mode = search_mode(mode), "Parsed Google Scholar results");
        Ok(articles.into_iter().map(Article::into_document).collect())
    }
}
