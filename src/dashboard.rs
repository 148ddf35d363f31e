//! Aggregate figures for the monitoring dashboard.
//!
//! Every collection of the store is normalised and merged, then summarised:
//! headline counts, where Talkwalker articles come from, the busiest domains,
//! the latest and the most relevant items, title word frequencies and the
//! number of publications collected per day.

use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{QueryMode, SourceKind};
use crate::normalize::{NormalizedArticle, normalize};
use crate::store::{DocumentStore, Filter};

const TOP_DOMAINS: usize = 10;
const MAX_WORDS: usize = 200;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
        "been", "between", "but", "by", "can", "could", "do", "does", "for", "from", "has",
        "have", "how", "if", "in", "into", "is", "it", "its", "may", "more", "new", "not", "of",
        "on", "or", "our", "over", "s", "so", "such", "than", "that", "the", "their", "them",
        "there", "these", "they", "this", "those", "through", "to", "under", "up", "using",
        "via", "was", "we", "were", "what", "when", "where", "which", "while", "who", "why",
        "will", "with", "within", "you", "your", "au", "aux", "avec", "ce", "ces", "dans", "de",
        "des", "du", "en", "et", "il", "la", "le", "les", "leur", "ou", "par", "pas", "pour",
        "qui", "que", "sa", "se", "son", "sur", "un", "une",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardItem {
    pub title: String,
    pub url: String,
    pub source_label: String,
    /// Readable name of the collection the record came from.
    pub collection_label: String,
    pub insertion_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
}

impl From<&NormalizedArticle> for DashboardItem {
    fn from(article: &NormalizedArticle) -> Self {
        Self {
            title: article.title.clone(),
            url: article.url.clone(),
            source_label: article.source_label.clone(),
            collection_label: article.collection_label.clone(),
            insertion_date: article.insertion_date,
            published_date: article.published_date,
        }
    }
}

/// Items shown in one list panel, all from its most recent insertion day,
/// most recently published first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemList {
    pub date: Option<NaiveDate>,
    /// Source labels the list can be filtered by.
    pub sources: Vec<String>,
    pub items: Vec<DashboardItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_publications: usize,
    pub unique_domains: usize,
    pub last_update: Option<NaiveDate>,
    pub countries: Vec<CountEntry>,
    pub top_domains: Vec<CountEntry>,
    pub latest: ItemList,
    pub relevant: ItemList,
    pub word_frequencies: Vec<CountEntry>,
    pub publications_per_day: Vec<DayCount>,
}

/// Normalised records of every collection in the store.
#[instrument(level = "info", skip_all)]
pub async fn load_articles<S: DocumentStore>(store: &S) -> Result<Vec<NormalizedArticle>> {
    let mut articles = Vec::new();
    for collection in store.collections().await? {
        let documents = store.find(&collection, &Filter::all()).await?;
        let before = articles.len();
        articles.extend(documents.iter().filter_map(|doc| normalize(&collection, doc)));
        let kept = articles.len() - before;
        if kept < documents.len() {
            warn!(
                %collection,
                skipped = documents.len() - kept,
                "Records without title or link"
            );
        }
    }
    info!(count = articles.len(), "Loaded articles");
    Ok(articles)
}

/// Counts sorted by decreasing count, then by name.
fn ranked<'a>(names: impl Iterator<Item = &'a str>) -> Vec<CountEntry> {
    names
        .counts()
        .into_iter()
        .map(|(name, count)| CountEntry {
            name: name.to_string(),
            count,
        })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)))
        .collect()
}

fn is_latest_panel(article: &NormalizedArticle) -> bool {
    article.kind == Some(SourceKind::GoogleAlerts) || article.mode == Some(QueryMode::Newest)
}

fn is_relevant_panel(article: &NormalizedArticle) -> bool {
    article.mode == Some(QueryMode::Relevant)
}

fn item_list<'a>(
    articles: impl Iterator<Item = &'a NormalizedArticle>,
    source_filter: Option<&str>,
) -> ItemList {
    let pool: Vec<&NormalizedArticle> = articles.collect();
    let date = pool.iter().filter_map(|a| a.insertion_date).max();
    let sources = pool
        .iter()
        .map(|a| a.source_label.clone())
        .sorted()
        .dedup()
        .collect();
    let items = pool
        .iter()
        .filter(|a| date.is_some() && a.insertion_date == date)
        .filter(|a| source_filter.is_none_or(|label| a.source_label == label))
        .map(|a| DashboardItem::from(*a))
        .sorted_by(|a, b| b.published_date.cmp(&a.published_date))
        .collect();
    ItemList {
        date,
        sources,
        items,
    }
}

/// Lower-cased title words, stop-words and single characters removed.
fn words(title: &str) -> impl Iterator<Item = String> + '_ {
    title
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(w.as_str()))
}

/// Build the dashboard from normalised records. `source_filter` restricts the
/// latest and relevant panels to one source label.
pub fn build(articles: &[NormalizedArticle], source_filter: Option<&str>) -> Dashboard {
    let unique_domains = articles
        .iter()
        .filter_map(|a| a.domain.as_deref())
        .collect::<HashSet<_>>()
        .len();

    let countries = ranked(
        articles
            .iter()
            .filter(|a| a.kind == Some(SourceKind::Talkwalker))
            .filter_map(|a| a.country.as_deref()),
    );

    let top_domains = ranked(articles.iter().filter_map(|a| a.domain.as_deref()))
        .into_iter()
        .take(TOP_DOMAINS)
        .collect();

    let all_words: Vec<String> = articles.iter().flat_map(|a| words(&a.title)).collect();
    let word_frequencies = ranked(all_words.iter().map(String::as_str))
        .into_iter()
        .take(MAX_WORDS)
        .collect();

    let publications_per_day = articles
        .iter()
        .filter_map(|a| a.insertion_date)
        .counts()
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .sorted_by_key(|d| d.date)
        .collect();

    Dashboard {
        total_publications: articles.len(),
        unique_domains,
        last_update: articles.iter().filter_map(|a| a.insertion_date).max(),
        countries,
        top_domains,
        latest: item_list(articles.iter().filter(|a| is_latest_panel(a)), source_filter),
        relevant: item_list(articles.iter().filter(|a| is_relevant_panel(a)), source_filter),
        word_frequencies,
        publications_per_day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{Value, json};

    fn article(collection: &str, fields: Value) -> NormalizedArticle {
        normalize(collection, fields.as_object().unwrap()).unwrap()
    }

    fn record(collection: &str, title: &str, url: &str, date: &str) -> NormalizedArticle {
        article(collection, json!({"title": title, "url": url, "date": date}))
    }

    fn alert(title: &str, url: &str, date: &str, country: &str) -> NormalizedArticle {
        article(
            "talkwalker_alerts_t",
            json!({"titre": title, "lien": url, "date": date, "pays": country}),
        )
    }

    fn sample() -> Vec<NormalizedArticle> {
        vec![
            record(
                "ieee_t_newest",
                "Robots for the farm",
                "https://ieeexplore.ieee.org/1",
                "2025-05-05",
            ),
            article(
                "ieee_t_newest",
                json!({
                    "title": "Farm data platforms",
                    "url": "https://ieeexplore.ieee.org/2",
                    "date": "2025-05-06",
                    "year": "Year: 2023"
                }),
            ),
            article(
                "springer_t_newest",
                json!({
                    "title": "Soil robots",
                    "url": "https://link.springer.com/3",
                    "date": "2025-05-06",
                    "published": "2025-04-28"
                }),
            ),
            record(
                "ieee_t_relevant",
                "The farm of the future",
                "https://ieeexplore.ieee.org/4",
                "2025-05-04",
            ),
            record(
                "google_alerts_t",
                "Farm news",
                "https://www.google.com/url?url=https://agri.com/5",
                "2025-05-06",
            ),
            alert("Drones", "https://agri.it", "2025-05-03", "Italy"),
            alert("Drones again", "https://agri.fr", "2025-05-03", "France"),
            alert("More drones", "https://agri2.fr", "2025-05-02", "France"),
        ]
    }

    #[test]
    fn test_headline_figures() {
        let dashboard = build(&sample(), None);
        assert_eq!(dashboard.total_publications, 8);
        assert_eq!(dashboard.unique_domains, 6);
        assert_eq!(dashboard.last_update, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(
            dashboard.top_domains[0],
            CountEntry { name: "ieeexplore.ieee.org".to_string(), count: 3 }
        );
        assert_eq!(
            dashboard.countries,
            vec![
                CountEntry { name: "France".to_string(), count: 2 },
                CountEntry { name: "Italy".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_countries_only_count_talkwalker_records() {
        let mut articles = sample();
        articles.push(article(
            "springer_t_newest",
            json!({"title": "Abroad", "url": "https://x.org", "country": "Spain"}),
        ));
        let dashboard = build(&articles, None);
        assert!(!dashboard.countries.iter().any(|c| c.name == "Spain"));
    }

    #[test]
    fn test_latest_and_relevant_panels() {
        let dashboard = build(&sample(), None);
        assert_eq!(dashboard.latest.date, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(dashboard.latest.items.len(), 3);
        assert_eq!(
            dashboard.latest.sources,
            vec!["Google Alerts", "IEEE Xplore", "Springer"]
        );
        assert_eq!(dashboard.relevant.items.len(), 1);
        assert_eq!(dashboard.relevant.date, NaiveDate::from_ymd_opt(2025, 5, 4));

        let filtered = build(&sample(), Some("Springer"));
        assert_eq!(filtered.latest.items.len(), 1);
        assert_eq!(filtered.latest.items[0].title, "Soil robots");
        assert!(filtered.relevant.items.is_empty());
    }

    #[test]
    fn test_panel_items_by_publication_date() {
        let latest = build(&sample(), None).latest.items;
        let titles: Vec<&str> = latest.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Soil robots", "Farm data platforms", "Farm news"]);
        assert_eq!(latest[0].published_date, NaiveDate::from_ymd_opt(2025, 4, 28));
        assert_eq!(latest[1].published_date, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(latest[2].published_date, None);
        assert_eq!(latest[0].collection_label, "Springer T Newest");
    }

    #[test]
    fn test_words_and_days() {
        let dashboard = build(&sample(), None);
        assert_eq!(
            dashboard.word_frequencies[0],
            CountEntry { name: "farm".to_string(), count: 4 }
        );
        assert!(
            !dashboard
                .word_frequencies
                .iter()
                .any(|w| w.name == "the" || w.name == "for")
        );

        let days: Vec<usize> = dashboard.publications_per_day.iter().map(|d| d.count).collect();
        assert_eq!(days, vec![1, 2, 1, 1, 3]);
        assert_eq!(
            dashboard.publications_per_day[0].date,
            NaiveDate::from_ymd_opt(2025, 5, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn test_load_articles_skips_incomplete_records() {
        let store = MemoryStore::new();
        let docs = vec![
            json!({"title": "ok", "url": "https://a.org"}).as_object().cloned().unwrap(),
            json!({"title": "no link"}).as_object().cloned().unwrap(),
        ];
        store.insert_many("wiley_t_newest", docs).await.unwrap();
        let articles = load_articles(&store).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_label, "Wiley Online Library");
        assert_eq!(articles[0].kind, Some(SourceKind::Wiley));
    }
}
