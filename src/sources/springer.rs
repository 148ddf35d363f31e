//! SpringerLink search result scraper.
//!
//! Results are marked up with `data-test` attributes, which have proven more
//! stable than the class names.

use scraper::Html;
use tracing::{info, instrument};
use url::Url;

use super::html::{first_text, selector, text_of};
use super::{InsertPolicy, Source, TITLE_AND_URL, mode_or_newest};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::http::{Fetch, Pacing, with_query};
use crate::models::{Article, Document, QueryMode, SourceKind};
use crate::utils::today;

const SITE_ROOT: &str = "https://link.springer.com";
const SEARCH_URL: &str = "https://link.springer.com/search";

#[derive(Debug, Clone)]
pub struct SpringerSource {
    query: String,
    pause_before: Pacing,
    pause_after: Pacing,
}

impl SpringerSource {
    pub fn new(query: &str, http: &HttpConfig) -> Self {
        Self {
            query: query.to_string(),
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
}

pub fn search_url(query: &str, mode: QueryMode) -> String {
    let sort = match mode {
        QueryMode::Newest => "newestFirst",
        QueryMode::Relevant => "relevance",
    };
    with_query(
        SEARCH_URL,
        &[
            ("new-search", "true"),
            ("query", query),
            ("content-type", "article"),
            ("content-type", "research"),
            ("sortBy", sort),
        ],
    )
}

pub fn parse_results(page: &str, date: &str) -> Result<Vec<Article>> {
    let document = Html::parse_document(page);
    let item_sel = selector(r#"li[data-test="search-result-item"]"#)?;
    let title_sel = selector(r#"h3[data-test="title"] a"#)?;
    let desc_sel = selector(r#"div[data-test="description"]"#)?;
    let published_sel = selector(r#"span[data-test="published"]"#)?;
    let authors_sel = selector(r#"span[data-test="authors"]"#)?;
    let root = Url::parse(SITE_ROOT)?;

    let items: Vec<_> = document.select(&item_sel).collect();
    if items.is_empty() {
        return Err(Error::NoResults(SourceKind::Springer.label().to_string()));
    }

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let link = item.select(&title_sel).next()?;
            let url = root.join(link.value().attr("href")?).ok()?;
            let article = Article::new(SourceKind::Springer, &text_of(link), url.as_str(), date)
                .with_description(first_text(item, &desc_sel))
                .with_published(first_text(item, &published_sel))
                .with_authors(first_text(item, &authors_sel));
            article.is_complete().then_some(article)
        })
        .collect())
}

impl Source for SpringerSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Springer
    }

    fn insert_policy(&self, _mode: Option<QueryMode>) -> InsertPolicy {
        InsertPolicy::SkipExisting(TITLE_AND_URL)
    }

    #[instrument(level = "info", skip_all, fields(source = "springer", ?mode))]
    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let url = search_url(&self.query, mode_or_newest(mode));
        self.pause_before.pause().await;
        let page = fetcher.get(&url).await?;
        self.pause_after.pause().await;

        let articles = parse_results(&page, &today())?;
        info!(count = articles.len(), %url, "Parsed Springer results");
        Ok(articles.into_iter().map(Article::into_document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedFetcher;

    const PAGE: &str = r#"
<ol>
  <li data-test="search-result-item">
    <h3 data-test="title">
      <a href="/article/10.1007/s11119-024-1">Robotics and Agriculture 4.0</a>
    </h3>
    <div data-test="description">A review of field robots.</div>
    <span data-test="authors">J. Smith, K. Tanaka</span>
    <span data-test="published">03 January 2025</span>
  </li>
  <li data-test="search-result-item">
    <h3 data-test="title"><a>Missing link</a></h3>
  </li>
</ol>"#;

    #[test]
    fn test_search_url() {
        assert_eq!(
            search_url("Agriculture 4.0", QueryMode::Newest),
            "https://link.springer.com/search?new-search=true&query=Agriculture%204.0\
             &content-type=article&content-type=research&sortBy=newestFirst"
        );
    }

    #[test]
    fn test_parse_results() {
        let articles = parse_results(PAGE, "2025-05-06").unwrap();
        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.url, "https://link.springer.com/article/10.1007/s11119-024-1");
        assert_eq!(a.description.as_deref(), Some("A review of field robots."));
        assert_eq!(a.published.as_deref(), Some("03 January 2025"));
        assert_eq!(a.authors.as_deref(), Some("J. Smith, K. Tanaka"));
    }

    #[tokio::test]
    async fn test_collect_reports_missing_items() {
        let fetcher = CannedFetcher::default().with_page("link.springer.com", "<html></html>");
        let source = SpringerSource::new("Agriculture 4.0", &HttpConfig::default())
            .with_pacing(Pacing::none(), Pacing::none());
        let result = source.collect(&fetcher, Some(QueryMode::Relevant)).await;
        assert!(matches!(result, Err(Error::NoResults(_))));
        assert!(fetcher.requested.lock().unwrap()[0].ends_with("sortBy=relevance"));
    }
}
