//! Google Alerts, read from saved alert emails and from Atom feeds.
//!
//! Alert emails embed their content as JSON in a
//! `<script type="application/json">` tag: `cards[].widgets[]`, where widgets
//! of type `LINK` are the alerted articles. Alerts delivered as feeds are Atom
//! documents whose entry links go through Google's redirector.

use futures::stream::{self, StreamExt};
use scraper::Html;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use super::html::selector;
use super::{InsertPolicy, Source, TITLE_AND_URL};
use crate::config::GoogleAlertsConfig;
use crate::error::Result;
use crate::http::Fetch;
use crate::models::{Article, Document, QueryMode, SourceKind};
use crate::utils::{collapse_whitespace, today, unwrap_google_redirect};

#[derive(Debug, Default, Deserialize)]
struct AlertPayload {
    #[serde(default)]
    cards: Vec<Card>,
}

#[derive(Debug, Default, Deserialize)]
struct Card {
    #[serde(default)]
    widgets: Vec<Widget>,
}

#[derive(Debug, Default, Deserialize)]
struct Widget {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    title: Option<TextNode>,
    #[serde(default)]
    link: Option<Link>,
    #[serde(default)]
    content: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href", default)]
    href: String,
}

/// Text content of an HTML fragment, entities decoded and whitespace collapsed.
fn strip_tags(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_whitespace(&parsed.root_element().text().collect::<String>())
}

/// Articles of one saved alert email. Emails without a parsable JSON payload
/// yield nothing.
pub fn parse_email(html: &str, date: &str) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let script_sel = selector(r#"script[type="application/json"]"#)?;
    let Some(script) = document.select(&script_sel).next() else {
        warn!("No JSON payload in alert email");
        return Ok(Vec::new());
    };
    let raw = script.text().collect::<String>();
    let payload: AlertPayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to parse alert email payload");
            return Ok(Vec::new());
        }
    };

    Ok(payload
        .cards
        .into_iter()
        .flat_map(|card| card.widgets)
        .filter(|widget| widget.kind == "LINK")
        .filter_map(|widget| {
            let article = Article::new(
                SourceKind::GoogleAlerts,
                widget.title.as_deref().unwrap_or_default(),
                widget.url.as_deref().unwrap_or_default(),
                date,
            )
            .with_description(widget.description);
            article.is_complete().then_some(article)
        })
        .collect())
}

/// Articles of an Atom alert feed.
pub fn parse_feed(xml: &str, date: &str) -> Result<Vec<Article>> {
    let feed: Feed = quick_xml::de::from_str(xml)?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = strip_tags(&entry.title?.value);
            let url = unwrap_google_redirect(entry.link?.href.trim());
            let description = entry.content.map(|c| strip_tags(&c.value));
            let article = Article::new(SourceKind::GoogleAlerts, &title, &url, date)
                .with_description(description);
            article.is_complete().then_some(article)
        })
        .collect())
}

/// `*.html` / `*.htm` files of the inbox folder, sorted by name. A missing
/// folder has no emails.
async fn email_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !fs::try_exists(folder).await? {
        debug!(folder = %folder.display(), "No alert inbox folder");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut entries = fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_html = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
        if is_html {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone)]
pub struct GoogleAlertsSource {
    inbox_dir: PathBuf,
    feeds: Vec<String>,
}

impl GoogleAlertsSource {
    pub fn new(config: &GoogleAlertsConfig) -> Self {
        Self {
            inbox_dir: config.inbox_dir.clone(),
            feeds: config.feeds.clone(),
        }
    }

    async fn from_emails(&self, date: &str) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        for path in email_files(&self.inbox_dir).await? {
            let bytes = fs::read(&path).await?;
            let html = String::from_utf8_lossy(&bytes);
            let found = parse_email(&html, date)?;
            debug!(path = %path.display(), count = found.len(), "Parsed alert email");
            articles.extend(found);
        }
        Ok(articles)
    }

    async fn from_feeds<F: Fetch>(&self, fetcher: &F, date: &str) -> Vec<Article> {
        let per_feed: Vec<Vec<Article>> = stream::iter(self.feeds.iter())
            .then(|feed_url| async move {
                match fetcher.get(feed_url).await.and_then(|xml| parse_feed(&xml, date)) {
                    Ok(found) => found,
                    Err(e) => {
                        error!(error = %e, "Alert feed failed");
                        Vec::new()
                    }
                }
            })
            .collect()
            .await;
        per_feed.into_iter().flatten().collect()
    }
}

impl Source for GoogleAlertsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GoogleAlerts
    }

    fn insert_policy(&self, _mode: Option<QueryMode>) -> InsertPolicy {
        InsertPolicy::SkipExisting(TITLE_AND_URL)
    }

    #[instrument(level = "info", skip_all, fields(source = "google_alerts"))]
    async fn collect<F: Fetch>(
        &self,
        fetcher: &F,
        _mode: Option<QueryMode>,
    ) -> Result<Vec<Document>> {
        let date = today();
        let mut articles = self.from_emails(&date).await?;
        let emailed = articles.len();
        articles.extend(self.from_feeds(fetcher, &date).await);
        info!(emailed, from_feeds = articles.len() - emailed, "Collected Google Alerts");
        Ok(articles.into_iter().map(Article::into_document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedFetcher;
    use serde_json::json;

    const EMAIL: &str = r#"<html><head>
<script type="application/json" data-scope="inboxmarkup">{
  "api_version": "1.0",
  "cards": [{"title": "Google Alerts", "widgets": [
    {
      "type": "LINK",
      "title": "Agriculture 4.0 startups raise funds",
      "description": "Investors bet on farm data",
      "url": "https://www.google.com/url?url=https://agfunder.com/a1"
    },
    {"type": "LINK", "title": "", "url": "https://nowhere.org"},
    {"type": "BUTTON", "title": "See more results", "url": "https://www.google.com/alerts"}
  ]}]
}</script></head><body>Alert</body></html>"#;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:idx="urn:atom-extension:indexing">
  <id>tag:google.com,2005:reader/user/1/state/com.google/alerts/2</id>
  <title>Google Alert - Agriculture 4.0</title>
  <link href="https://www.google.com/alerts/feeds/1/2" rel="self"></link>
  <updated>2025-05-06T08:00:00Z</updated>
  <entry>
    <id>tag:google.com,2013:googlealerts/feed:1</id>
    <title type="html">How &lt;b&gt;Agriculture 4.0&lt;/b&gt; changes dairy farms</title>
    <link
    href="https://www.google.com/url?rct=j&amp;sa=t&amp;url=https://www.dairynews.com/a4&amp;ct=ga"
    ></link>
    <published>2025-05-06T07:00:00Z</published>
    <content type="html">Sensors and &lt;b&gt;robots&lt;/b&gt; in the barn</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_email() {
        let articles = parse_email(EMAIL, "2025-05-06").unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Agriculture 4.0 startups raise funds");
        assert_eq!(articles[0].description.as_deref(), Some("Investors bet on farm data"));
        assert_eq!(articles[0].source, "Google Alerts");
    }

    #[test]
    fn test_email_without_payload() {
        assert!(parse_email("<html><body>hi</body></html>", "2025-05-06").unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed() {
        let articles = parse_feed(FEED, "2025-05-06").unwrap();
        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.title, "How Agriculture 4.0 changes dairy farms");
        assert_eq!(a.url, "https://www.dairynews.com/a4");
        assert_eq!(a.description.as_deref(), Some("Sensors and robots in the barn"));
    }

    #[tokio::test]
    async fn test_collect_reads_inbox_and_feeds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alert-1.html"), EMAIL).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not an alert").unwrap();

        let config = GoogleAlertsConfig {
            inbox_dir: dir.path().to_path_buf(),
            feeds: vec![
                "https://www.google.com/alerts/feeds/1/2".to_string(),
                "https://www.google.com/alerts/feeds/broken".to_string(),
            ],
        };
        let fetcher = CannedFetcher::default().with_page("feeds/1/2", FEED);
        let docs = GoogleAlertsSource::new(&config)
            .collect(&fetcher, None)
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["url"], json!("https://www.dairynews.com/a4"));
    }
}
