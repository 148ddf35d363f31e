//! IEEE Xplore search result scraper.
//!
//! The search page lists results in `div.result-item-align` blocks. Title
//! links are site-relative (`/document/10123456/`) and are resolved against
//! `https://ieeexplore.ieee.org`. The list is built by JavaScript, so the
//! page is fetched rendered and the fetch waits for the first result block.

use scraper::Html;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use super::html::{first_text, selector, text_of};
use super::{InsertPolicy, Source, TITLE_AND_URL, mode_or_newest};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::http::{Fetch, Pacing, with_query};
use crate::models::{Article, Document, QueryMode, SourceKind};
use crate::utils::today;

const SITE_ROOT: &str = "https://ieeexplore.ieee.org";
const SEARCH_URL: &str = "https://ieeexplore.ieee.org/search/searchresult.jsp";
const ITEM: &str = "div.result-item-align";

#[derive(Debug, Clone)]
pub struct IeeeSource {
    query: String,
    pause_after: Pacing,
}

impl IeeeSource {
    pub fn new(query: &str, http: &HttpConfig) -> Self {
        Self {
            query: query.to_string(),
            pause_after: http.pause_after_render,
        }
    }

    #[cfg(test)]
    pub fn with_pacing(mut self, pause_after: Pacing) -> Self {
        self.pause_after = pause_after;
        self
    }
}

/// Search URL for a query; `Newest` adds `sortType=newest`.
pub fn search_url(query: &str, mode: QueryMode) -> String {
    let url = with_query(
        SEARCH_URL,
        &[
            ("queryText", query),
            ("highlight", "true"),
            ("returnType", "SEARCH"),
            ("returnFacets", "ALL"),
        ],
    );
    match mode {
        QueryMode::Newest => format!("{url}&sortType=newest"),
        QueryMode::Relevant => url,
    }
}

/// Parse a search result page into articles stamped with `date`.
pub fn parse_results(page: &str, date: &str) -> Result<Vec<Article>> {
    let document = Html::parse_document(page);
    let item_sel = selector(ITEM)?;
    let link_sel = selector("h3 a")?;
    let author_sel = selector("p.author")?;
    let conference_sel = selector("div.description a")?;
    let span_sel = selector("span")?;
    let root = Url::parse(SITE_ROOT)?;

    let items: Vec<_> = document.select(&item_sel).collect();
    if items.is_empty() {
        return Err(Error::NoResults(SourceKind::Ieee.label().to_string()));
    }

    let mut articles = Vec::new();
    for item in items {
        let Some(link) = item.select(&link_sel).next() else {
            debug!("IEEE result without title link; skipping");
            continue;
        };
        let title = text_of(link);
        let url = link
            .value()
            .attr("href")
            .and_then(|href| root.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_default();

        let year = item
            .select(&span_sel)
            .map(text_of)
            .find(|text| text.contains("Year:"));

        let article = Article::new(SourceKind::Ieee, &title, &url, date)
            .with_authors(first_text(item, &author_sel))
            .with_field("conference", first_text(item, &conference_sel).map(Value::from))
            .with_field("year", year.map(Value::from));

        if article.is_complete() {
            articles.push(article);
        }
    }
    Ok(articles)
}

impl Source for IeeeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ieee
    }

    fn insert_policy(&self, mode: Option<QueryMode>) -> InsertPolicy {
        match mode_or_newest(mode) {
            QueryMode::Relevant => InsertPolicy::Replace,
            QueryMode::Newest => InsertPolicy::SkipExisting(TITLE_AND_URL),
        }
    }

    #[instrument(level = "info", skip_all, fields(source = "ieee", ?mode))]
    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let url = search_url(&self.query, mode_or_newest(mode));
        let page = fetcher.get_rendered(&url, ITEM).await?;
        self.pause_after.pause().await;

        let articles = parse_results(&page, &today())?;
        info!(count = articles.len(), %url, "Parsed IEEE results");
        Ok(articles.into_iter().map(Article::into_document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedFetcher;
    use serde_json::json;

    const PAGE: &str = r#"
<html><body>
  <div class="result-item-align">
    <h3><a href="/document/10123456/">Digital twins for <span>Agriculture 4.0</span></a></h3>
    <p class="author"><span>A. Rossi; B. Chen</span></p>
    <div class="description">
      <a href="/xpl/conhome/1">2024 IEEE Conference on AgriFood Electronics</a>
      <span>Year: 2024</span>
    </div>
  </div>
  <div class="result-item-align">
    <p class="author">No title here</p>
  </div>
  <div class="result-item-align">
    <h3><a href="https://ieeexplore.ieee.org/document/99/">IoT sensing in smart farms</a></h3>
  </div>
</body></html>"#;

    #[test]
    fn test_search_urls() {
        assert_eq!(
            search_url("Agriculture 4.0", QueryMode::Relevant),
            "https://ieeexplore.ieee.org/search/searchresult.jsp?queryText=Agriculture%204.0\
             &highlight=true&returnType=SEARCH&returnFacets=ALL"
        );
        assert!(search_url("Agriculture 4.0", QueryMode::Newest).ends_with("&sortType=newest"));
    }

    #[test]
    fn test_parse_results() {
        let articles = parse_results(PAGE, "2025-05-06").unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Digital twins for Agriculture 4.0");
        assert_eq!(first.url, "https://ieeexplore.ieee.org/document/10123456/");
        assert_eq!(first.authors.as_deref(), Some("A. Rossi; B. Chen"));
        assert_eq!(
            first.extra["conference"],
            json!("2024 IEEE Conference on AgriFood Electronics")
        );
        assert_eq!(first.extra["year"], json!("Year: 2024"));
        assert_eq!(first.source, "IEEE Xplore");
        assert_eq!(first.date, "2025-05-06");

        let second = &articles[1];
        assert!(second.authors.is_none());
        assert!(!second.extra.contains_key("year"));
    }

    #[test]
    fn test_empty_page_is_no_results() {
        let result = parse_results("<html><body><p>Loading</p></body></html>", "2025-05-06");
        assert!(matches!(result, Err(Error::NoResults(_))));
    }

    #[tokio::test]
    async fn test_collect_fetches_mode_url() {
        let fetcher = CannedFetcher::default().with_page("sortType=newest", PAGE);
        let source = IeeeSource::new("Agriculture 4.0", &HttpConfig::default())
            .with_pacing(Pacing::none());

        let docs = source.collect(&fetcher, Some(QueryMode::Newest)).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["source"], json!("IEEE Xplore"));
        let rendered = fetcher.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].0.ends_with("sortType=newest"));
        assert_eq!(rendered[0].1, "div.result-item-align");

        // The relevant page was never served.
        assert!(source.collect(&fetcher, Some(QueryMode::Relevant)).await.is_err());
    }
}
