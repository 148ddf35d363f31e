//! Markdown rendering of the dashboard aggregate.

use chrono::NaiveDate;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::dashboard::{CountEntry, Dashboard, ItemList};
use crate::error::Result;

/// Words listed in the Markdown report; the JSON keeps the full list.
const WORDS_SHOWN: usize = 30;

fn or_dash(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Markdown link text cannot contain unbalanced brackets.
fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// A bare `|` would split a table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn counts_table(md: &mut String, header: &str, entries: &[CountEntry]) {
    if entries.is_empty() {
        writeln!(md, "_No data._\n").unwrap();
        return;
    }
    writeln!(md, "| {header} | Count |").unwrap();
    writeln!(md, "|---|---|").unwrap();
    for entry in entries {
        writeln!(md, "| {} | {} |", escape_cell(&entry.name), entry.count).unwrap();
    }
    writeln!(md).unwrap();
}

fn item_list(md: &mut String, list: &ItemList) {
    writeln!(md, "Collected on {}.\n", or_dash(list.date)).unwrap();
    if list.items.is_empty() {
        writeln!(md, "_No articles._\n").unwrap();
        return;
    }
    for item in &list.items {
        write!(
            md,
            "- [{}]({}) ({}",
            escape_link_text(&item.title),
            item.url,
            item.source_label
        )
        .unwrap();
        if let Some(published) = item.published_date {
            write!(md, ", published {published}").unwrap();
        }
        writeln!(md, ")").unwrap();
    }
    writeln!(md).unwrap();
}

/// Render the dashboard generated on `date`.
pub fn dashboard_to_markdown(dashboard: &Dashboard, date: NaiveDate) -> String {
    let mut md = String::new();

    writeln!(md, "# Publication watch, {date}\n").unwrap();
    writeln!(md, "- Publications: {}", dashboard.total_publications).unwrap();
    writeln!(md, "- Unique domains: {}", dashboard.unique_domains).unwrap();
    writeln!(md, "- Last update: {}\n", or_dash(dashboard.last_update)).unwrap();

    writeln!(md, "## Latest articles\n").unwrap();
    item_list(&mut md, &dashboard.latest);

    writeln!(md, "## Most relevant articles\n").unwrap();
    item_list(&mut md, &dashboard.relevant);

    writeln!(md, "## Top domains\n").unwrap();
    counts_table(&mut md, "Domain", &dashboard.top_domains);

    writeln!(md, "## Countries (Talkwalker)\n").unwrap();
    counts_table(&mut md, "Country", &dashboard.countries);

    writeln!(md, "## Frequent title words\n").unwrap();
    let shown = dashboard.word_frequencies.len().min(WORDS_SHOWN);
    counts_table(&mut md, "Word", &dashboard.word_frequencies[..shown]);

    writeln!(md, "## Publications per day\n").unwrap();
    if dashboard.publications_per_day.is_empty() {
        writeln!(md, "_No data._").unwrap();
    } else {
        writeln!(md, "| Day | Count |").unwrap();
        writeln!(md, "|---|---|").unwrap();
        for day in &dashboard.publications_per_day {
            writeln!(md, "| {} | {} |", day.date, day.count).unwrap();
        }
    }

    md
}

/// Write the report to `{output_dir}/dashboard_{date}.md`, returning the path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %date))]
pub async fn write_markdown(
    dashboard: &Dashboard,
    output_dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    let md = dashboard_to_markdown(dashboard, date);
    fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(format!("dashboard_{date}.md"));
    fs::write(&path, md).await?;
    info!(path = %path.display(), "Wrote dashboard Markdown");
    Ok(path)
}
