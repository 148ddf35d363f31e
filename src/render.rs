//! Headless Chrome rendering for result pages built by JavaScript.
//!
//! IEEE Xplore and Wiley Online Library send an empty shell and fill the
//! result list from script. With the `js-rendering` feature the page is
//! loaded in Chrome over the DevTools protocol and its DOM is read back once
//! the result list appears. Without the feature [`BrowserRenderer`] is a stub
//! whose `render` always fails.

use crate::config::RenderConfig;
use crate::error::{Error, Result};

/// Whether this build can drive a browser.
pub fn is_available() -> bool {
    cfg!(feature = "js-rendering")
}

#[cfg(feature = "js-rendering")]
mod browser_impl {
    use super::*;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use std::time::{Duration, Instant};
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};
    use tracing::{debug, info, instrument, warn};

    use crate::utils::domain_of;

    const POLL_INTERVAL: Duration = Duration::from_millis(250);

    struct Running {
        browser: Browser,
        handler: JoinHandle<()>,
    }

    /// One lazily launched Chrome shared by every rendered fetch.
    pub struct BrowserRenderer {
        config: RenderConfig,
        user_agent: String,
        running: Mutex<Option<Running>>,
    }

    impl BrowserRenderer {
        pub fn new(config: RenderConfig, user_agent: &str) -> Self {
            Self {
                config,
                user_agent: user_agent.to_string(),
                running: Mutex::new(None),
            }
        }

        async fn launch(&self) -> Result<Running> {
            info!(headless = self.config.headless, "Launching Chrome");
            let mut builder = BrowserConfig::builder()
                .request_timeout(self.config.page_load_timeout())
                .arg(format!("--user-agent={}", self.user_agent))
                .arg("--lang=en-US")
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--disable-extensions");
            if !self.config.headless {
                builder = builder.with_head();
            }
            if !self.config.sandbox {
                builder = builder.no_sandbox();
            }
            let browser_config = builder
                .build()
                .map_err(|e| Error::Render(format!("browser config: {e}")))?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| Error::Render(format!("launch failed: {e}")))?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });
            Ok(Running { browser, handler })
        }

        /// Poll until `selector` matches or the selector timeout runs out.
        async fn wait_for(&self, page: &Page, selector: &str) -> bool {
            let deadline = Instant::now() + self.config.selector_timeout();
            loop {
                if page.find_element(selector).await.is_ok() {
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        async fn load(&self, page: &Page, selector: &str) -> Result<String> {
            timeout(self.config.page_load_timeout(), page.wait_for_navigation())
                .await
                .map_err(|_| Error::Render("page load timed out".to_string()))?
                .map_err(|e| Error::Render(format!("navigation failed: {e}")))?;
            if !self.wait_for(page, selector).await {
                warn!(selector, "Result list never appeared; reading the page anyway");
            }
            page.content()
                .await
                .map_err(|e| Error::Render(format!("reading the DOM failed: {e}")))
        }

        /// Load `url`, wait for `selector` and return the rendered HTML.
        #[instrument(level = "info", skip_all, fields(host = %domain_of(url).unwrap_or_default()))]
        pub async fn render(&self, url: &str, selector: &str) -> Result<String> {
            let t0 = Instant::now();
            let mut running = self.running.lock().await;
            if running.is_none() {
                *running = Some(self.launch().await?);
            }
            let Some(Running { browser, .. }) = running.as_ref() else {
                return Err(Error::Render("browser not running".to_string()));
            };

            let page = browser
                .new_page(url)
                .await
                .map_err(|e| Error::Render(format!("opening a tab failed: {e}")))?;
            let html = self.load(&page, selector).await;
            if let Err(e) = page.close().await {
                warn!(error = %e, "Closing the tab failed");
            }
            let html = html?;
            debug!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                bytes = html.len(),
                "Rendered"
            );
            Ok(html)
        }

        pub async fn close(&self) -> Result<()> {
            if let Some(Running { mut browser, handler }) = self.running.lock().await.take() {
                let closed = browser.close().await;
                handler.abort();
                closed.map_err(|e| Error::Render(format!("closing Chrome failed: {e}")))?;
                info!("Chrome closed");
            }
            Ok(())
        }
    }
}

#[cfg(feature = "js-rendering")]
pub use browser_impl::BrowserRenderer;

/// Stand-in used when the crate is built without `js-rendering`.
#[cfg(not(feature = "js-rendering"))]
pub struct BrowserRenderer {
    _config: RenderConfig,
}

#[cfg(not(feature = "js-rendering"))]
impl BrowserRenderer {
    pub fn new(config: RenderConfig, _user_agent: &str) -> Self {
        Self { _config: config }
    }

    pub async fn render(&self, _url: &str, _selector: &str) -> Result<String> {
        Err(Error::Render(
            "built without the js-rendering feature".to_string(),
        ))
    }

    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}
