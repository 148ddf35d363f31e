//! Utility functions for dates, string clean-up, URL domains and file system checks.
//!
//! This module provides helpers used throughout the application:
//! - The insertion-day stamp put on every collected record
//! - String truncation and whitespace handling for titles and logs
//! - Domain extraction, unwrapping Google redirect links
//! - File system validation for output directories

use chrono::Local;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

use crate::error::Result;

/// Today's local date as `YYYY-MM-DD`, the insertion stamp of collected records.
pub fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) with
/// an ellipsis and the number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Keep at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Replace every run of whitespace (newlines and tabs included) by one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalize the first character of a string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(upcase("hello"), "Hello");
/// assert_eq!(upcase(""), "");
/// ```
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Follow a Google redirect link (`https://www.google.com/url?...&url=<target>`)
/// to its target. Other URLs are returned unchanged.
pub fn unwrap_google_redirect(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let is_google = parsed
        .host_str()
        .is_some_and(|host| host == "google.com" || host.ends_with(".google.com"));
    if !is_google || parsed.path() != "/url" {
        return url.to_string();
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "url" || key == "q")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| url.to_string())
}

/// Lower-cased host of a URL, after unwrapping Google redirects.
pub fn domain_of(url: &str) -> Option<String> {
    let target = unwrap_google_redirect(url.trim());
    Url::parse(&target)
        .ok()?
        .host_str()
        .map(|host| host.to_lowercase())
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let scratch = path.join(".agriwatch_write_check");
    stdfs::File::create(&scratch)?;
    let _ = stdfs::remove_file(&scratch);
    info!("Output directory is writable");
    Ok(())
}
