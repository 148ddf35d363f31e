//! Wiley Online Library search result scraper.
//!
//! Results are inserted by script after the page loads, so the page is
//! fetched rendered, waiting on the first `li.search__item`.

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

const SITE_ROOT: &str = "https://onlinelibrary.wiley.com";
const SEARCH_URL: &str = "https://onlinelibrary.wiley.com/action/doSearch";
const EPUB_PREFIX: &str = "First published:";
const ITEM: &str = "li.search__item";

#[derive(Debug, Clone)]
pub struct WileySource {
    query: String,
    pause_after: Pacing,
}

impl WileySource {
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

/// Newest maps to Wiley's `Earliest` sort order, relevant to `relevancy`.
pub fn search_url(query: &str, mode: QueryMode) -> String {
    let sort = match mode {
        QueryMode::Newest => "Earliest",
        QueryMode::Relevant => "relevancy",
    };
    with_query(
        SEARCH_URL,
        &[("AllField", query), ("startPage", "0"), ("sortBy", sort)],
    )
}

pub fn parse_results(page: &str, date: &str) -> Result<Vec<Article>> {
    let document = Html::parse_document(page);
    let item_sel = selector(ITEM)?;
    let title_sel = selector("h2.meta__title a")?;
    let author_sel = selector("div.meta__authors")?;
    let journal_sel = selector("a.publication_meta_serial")?;
    let epub_sel = selector("p.meta__epubDate")?;
    let root = Url::parse(SITE_ROOT)?;

    let items: Vec<_> = document.select(&item_sel).collect();
    if items.is_empty() {
        return Err(Error::NoResults(SourceKind::Wiley.label().to_string()));
    }

    let mut articles = Vec::new();
    for item in items {
        let Some(link) = item.select(&title_sel).next() else {
            debug!("Wiley result without title; skipping");
            continue;
        };
        let url = link
            .value()
            .attr("href")
            .and_then(|href| root.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_default();
        let published = first_text(item, &epub_sel)
            .map(|text| text.trim_start_matches(EPUB_PREFIX).trim().to_string());

        let article = Article::new(SourceKind::Wiley, &text_of(link), &url, date)
            .with_authors(first_text(item, &author_sel))
            .with_published(published)
            .with_field("journal", first_text(item, &journal_sel).map(Value::from));

        if article.is_complete() {
            articles.push(article);
        }
    }
    Ok(articles)
}

impl Source for WileySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Wiley
    }

    fn insert_policy(&self, _mode: Option<QueryMode>) -> InsertPolicy {
        InsertPolicy::SkipExisting(TITLE_AND_URL)
    }

    #[instrument(level = "info", skip_all, fields(source = "wiley", ?mode))]
    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let url = search_url(&self.query, mode_or_newest(mode));
        let page = fetcher.get_rendered(&url, ITEM).await?;
        self.pause_after.pause().await;

        let articles = parse_results(&page, &today())?;
        info!(count = articles.len(), %url, "Parsed Wiley results");
        Ok(articles.into_iter().map(Article::into_document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedFetcher;
    use serde_json::json;

    const PAGE: &str = r#"
<ul>
  <li class="search__item">
    <h2 class="meta__title">
      <a href="/doi/10.1002/agj2.1234">Precision irrigation in Agriculture 4.0</a>
    </h2>
    <div class="meta__authors">M. Dupont, L. Garcia</div>
    <a class="publication_meta_serial" href="/journal/1">Agronomy Journal</a>
    <p class="meta__epubDate">First published: 12 March 2024</p>
  </li>
  <li class="search__item">
    <h2 class="meta__title"><a href="">   </a></h2>
  </li>
</ul>"#;

    #[test]
    fn test_search_url_sort_orders() {
        assert!(search_url("Agriculture 4.0", QueryMode::Newest).ends_with("sortBy=Earliest"));
        assert_eq!(
            search_url("Agriculture 4.0", QueryMode::Relevant),
            "https://onlinelibrary.wiley.com/action/doSearch?AllField=Agriculture%204.0\
             &startPage=0&sortBy=relevancy"
        );
    }

    #[test]
    fn test_parse_results() {
        let articles = parse_results(PAGE, "2025-05-06").unwrap();
        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.url, "https://onlinelibrary.wiley.com/doi/10.1002/agj2.1234");
        assert_eq!(a.published.as_deref(), Some("12 March 2024"));
        assert_eq!(a.extra["journal"], json!("Agronomy Journal"));
        assert_eq!(a.authors.as_deref(), Some("M. Dupont, L. Garcia"));
    }

    #[test]
    fn test_no_items_is_no_results() {
        assert!(matches!(parse_results("<ul></ul>", "2025-05-06"), Err(Error::NoResults(_))));
    }

    #[tokio::test]
    async fn test_collect_waits_for_result_items() {
        let fetcher = CannedFetcher::default().with_page("sortBy=relevancy", PAGE);
        let source = WileySource::new("Agriculture 4.0", &HttpConfig::default())
            .with_pacing(Pacing::none());

        let docs = source.collect(&fetcher, Some(QueryMode::Relevant)).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["source"], json!("Wiley Online Library"));

        let rendered = fetcher.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, "li.search__item");
    }
}
