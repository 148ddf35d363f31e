//! Outbound page fetching with user-agent rotation, pacing and retries.
//!
//! # Architecture
//!
//! - [`Fetch`]: core trait, "give me the body behind this URL"
//! - [`HttpFetcher`]: `reqwest` implementation rotating static browser user agents
//! - [`PageFetcher`]: plain HTTP plus a headless browser for script-built pages
//! - [`RetryFetch`]: decorator adding exponential backoff to any [`Fetch`]
//! - [`Pacing`]: random human-like pauses around page loads
//!
//! # Retry Strategy
//!
//! Only transient failures are retried (timeouts, connection errors, HTTP 429
//! and 5xx). The delay doubles from the base delay, is capped at 30 seconds and
//! gets 0-250ms of random jitter.

use rand::seq::IndexedRandom;
use rand::{Rng, rng};
use reqwest::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::HttpConfig;
use crate::error::Result;
use crate::render::{self, BrowserRenderer};
use crate::utils::domain_of;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";

/// Something that can turn a URL into a response body.
pub trait Fetch {
    async fn get(&self, url: &str) -> Result<String>;

    /// The page as a browser sees it once `wait_for` matches. Fetchers
    /// without a browser return the raw body.
    async fn get_rendered(&self, url: &str, _wait_for: &str) -> Result<String> {
        self.get(url).await
    }
}

/// A random pause drawn uniformly from `min_ms..=max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pacing {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Pacing {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// No pause at all.
    #[cfg(test)]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn draw(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng().random_range(self.min_ms..=self.max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.draw();
        if !delay.is_zero() {
            debug!(?delay, "Pausing");
            sleep(delay).await;
        }
    }
}

/// `reqwest` client sending each request with a randomly picked user agent.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
        })
    }

    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0")
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("user_agents", &self.user_agents.len())
            .finish()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(host = %domain_of(url).unwrap_or_default()))]
    async fn get(&self, url: &str) -> Result<String> {
        let t0 = Instant::now();
        let user_agent = self.pick_user_agent().to_string();
        // reqwest errors quote the full URL, query string and API keys included.
        let body = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(ACCEPT, PAGE_ACCEPT)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(reqwest::Error::without_url)?
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = body.len(),
            "Fetched"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }

    async fn with_retries<Op, Fut>(&self, op: Op) -> Result<String>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => {
                    error!(error = %e, "get() failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "get() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "get() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    // Query strings may carry API keys, so only the host is recorded.
    #[instrument(level = "info", skip_all, fields(host = %domain_of(url).unwrap_or_default()))]
    async fn get(&self, url: &str) -> Result<String> {
        self.with_retries(move || self.inner.get(url)).await
    }

    #[instrument(level = "info", skip_all, fields(host = %domain_of(url).unwrap_or_default()))]
    async fn get_rendered(&self, url: &str, wait_for: &str) -> Result<String> {
        self.with_retries(move || self.inner.get_rendered(url, wait_for)).await
    }
}

/// Plain HTTP for most pages, Chrome for the ones built by JavaScript.
///
/// The browser is only used when rendering is enabled in the configuration
/// and the crate was built with `js-rendering`.
pub struct PageFetcher {
    http: HttpFetcher,
    browser: Option<BrowserRenderer>,
}

impl PageFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let http = HttpFetcher::new(config)?;
        let browser = match (config.render.enabled, render::is_available()) {
            (true, true) => {
                let user_agent = http.pick_user_agent().to_string();
                Some(BrowserRenderer::new(config.render.clone(), &user_agent))
            }
            (true, false) => {
                warn!(
                    "Browser rendering is enabled but this build lacks the js-rendering \
                     feature; IEEE and Wiley pages will be fetched over plain HTTP"
                );
                None
            }
            (false, _) => None,
        };
        Ok(Self { http, browser })
    }

    /// Shut the browser down, if one was launched.
    pub async fn close(&self) -> Result<()> {
        match &self.browser {
            Some(browser) => browser.close().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFetcher")
            .field("http", &self.http)
            .field("browser", &self.browser.is_some())
            .finish()
    }
}

impl Fetch for PageFetcher {
    async fn get(&self, url: &str) -> Result<String> {
        self.http.get(url).await
    }

    async fn get_rendered(&self, url: &str, wait_for: &str) -> Result<String> {
        match &self.browser {
            Some(browser) => browser.render(url, wait_for).await,
            None => {
                info!(wait_for, "No browser available; fetching the raw page");
                self.http.get(url).await
            }
        }
    }
}

/// The fetcher every collector shares: HTTP and browser behind retries.
pub type DefaultFetcher = RetryFetch<PageFetcher>;

pub fn default_fetcher(config: &HttpConfig) -> Result<DefaultFetcher> {
    Ok(RetryFetch::new(
        PageFetcher::new(config)?,
        config.max_retries,
        config.retry_base_delay(),
    ))
}

/// Build a URL from a base and query parameters, percent-encoding the values.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        base.to_string()
    } else if base.contains('?') {
        format!("{base}&{query}")
    } else {
        format!("{base}?{query}")
    }
}

/// A fetcher for tests: serves canned bodies by URL substring.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct CannedFetcher {
        pages: Vec<(String, String)>,
        pub requested: Mutex<Vec<String>>,
        /// `(url, wait_for)` of every rendered fetch.
        pub rendered: Mutex<Vec<(String, String)>>,
    }

    impl CannedFetcher {
        pub fn with_page(mut self, url_part: &str, body: &str) -> Self {
            self.pages.push((url_part.to_string(), body.to_string()));
            self
        }
    }

    impl Fetch for CannedFetcher {
        async fn get(&self, url: &str) -> Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .iter()
                .find(|(part, _)| url.contains(part.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| Error::NoResults(url.to_string()))
        }

        async fn get_rendered(&self, url: &str, wait_for: &str) -> Result<String> {
            self.rendered
                .lock()
                .unwrap()
                .push((url.to_string(), wait_for.to_string()));
            self.get(url).await
        }
    }
}
