//! Minimal WHOIS client (RFC 3912) used to read domain creation dates.
//!
//! A lookup asks the IANA server which registry serves the top-level domain
//! (`refer:` / `whois:` line), queries that registry and, when the registry
//! answer is thin, follows one `Registrar WHOIS Server:` hop.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

const WHOIS_PORT: u16 = 43;
/// Longest answer read from a server; the rest is dropped.
const MAX_ANSWER_BYTES: u64 = 64 * 1024;

/// Keys registries use for the creation date, lower-cased.
const CREATION_KEYS: &[&str] = &[
    "creation date",
    "created",
    "created on",
    "created date",
    "creation_date",
    "registered on",
    "registered",
    "registration time",
    "registration date",
    "domain registration date",
    "domain create date",
    "domain name commencement date",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%b-%Y", "%d-%B-%Y", "%d.%m.%Y", "%Y.%m.%d", "%d/%m/%Y", "%Y/%m/%d",
    "%d %B %Y", "%d %b %Y", "%Y%m%d",
];

pub trait WhoisLookup {
    /// Creation date of a registered domain, `None` when the registry has no
    /// record or does not publish one.
    async fn creation_date(&self, domain: &str) -> Result<Option<DateTime<Utc>>>;
}

#[derive(Debug, Clone)]
pub struct WhoisClient {
    root_server: String,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(root_server: &str, timeout: Duration) -> Self {
        Self {
            root_server: root_server.to_string(),
            timeout,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn query(&self, server: &str, query: &str) -> Result<String> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT)).await?;
            stream.write_all(format!("{query}\r\n").as_bytes()).await?;
            read_answer(stream, MAX_ANSWER_BYTES).await
        };
        match timeout(self.timeout, exchange).await {
            Ok(answer) => answer,
            Err(_) => Err(Error::Whois(format!("{server} timed out"))),
        }
    }
}

async fn read_answer<R: AsyncRead + Unpin>(reader: R, limit: u64) -> Result<String> {
    let mut raw = Vec::new();
    reader.take(limit).read_to_end(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

impl WhoisLookup for WhoisClient {
    #[instrument(level = "info", skip(self))]
    async fn creation_date(&self, domain: &str) -> Result<Option<DateTime<Utc>>> {
        let tld = domain
            .rsplit('.')
            .next()
            .filter(|tld| !tld.is_empty())
            .ok_or_else(|| Error::Whois(format!("no top-level domain in {domain}")))?;

        let iana = self.query(&self.root_server, tld).await?;
        let registry = parse_referral(&iana)
            .ok_or_else(|| Error::Whois(format!("no WHOIS server for .{tld}")))?;

        let answer = self.query(&registry, domain).await?;
        if let Some(created) = earliest_creation_date(&answer) {
            return Ok(Some(created));
        }

        match parse_registrar_server(&answer) {
            Some(registrar) if !registrar.eq_ignore_ascii_case(&registry) => {
                debug!(%registrar, "Following registrar referral");
                let answer = self.query(&registrar, domain).await?;
                Ok(earliest_creation_date(&answer))
            }
            _ => Ok(None),
        }
    }
}

fn key_value(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_lowercase(), value.trim()))
}

/// Registry server named by an IANA answer.
pub fn parse_referral(answer: &str) -> Option<String> {
    answer
        .lines()
        .filter_map(key_value)
        .find(|(key, value)| (key == "refer" || key == "whois") && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Registrar WHOIS Server:` of a thin registry answer, scheme stripped.
pub fn parse_registrar_server(answer: &str) -> Option<String> {
    answer
        .lines()
        .filter_map(key_value)
        .find(|(key, value)| key == "registrar whois server" && !value.is_empty())
        .map(|(_, value)| {
            value
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        })
}

/// Parse the date formats registries print.
pub fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let value = value.trim_end_matches(" UTC").trim_end_matches('Z');
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    let head = value.split_whitespace().next().unwrap_or_default();
    for candidate in [value, head] {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
        }
    }
    None
}

/// Earliest creation date found in a WHOIS answer.
pub fn earliest_creation_date(answer: &str) -> Option<DateTime<Utc>> {
    answer
        .lines()
        .filter_map(key_value)
        .filter(|(key, _)| CREATION_KEYS.contains(&key.as_str()))
        .filter_map(|(_, value)| parse_whois_date(value))
        .min()
}
