//! Error type shared by the collectors, the store and the credibility filter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Feed parse error: {0}")]
    Feed(#[from] quick_xml::de::DeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("No result items found for {0}")]
    NoResults(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(&'static str),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Browser rendering error: {0}")]
    Render(String),

    #[error("WHOIS error: {0}")]
    Whois(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Failures worth another attempt: timeouts, dropped connections,
    /// throttling and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            Error::Io(_) => true,
            _ => false,
        }
    }
}
