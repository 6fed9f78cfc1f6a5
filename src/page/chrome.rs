use std::future::Future;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::{Result, RssForwardError};
use crate::page::config::RenderConfig;

/// Headless Chrome page renderer for listings built by JavaScript.
///
/// The browser process lives until [`ChromeRenderer::close`].
pub struct ChromeRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    config: RenderConfig,
}

impl ChromeRenderer {
    /// Launch a browser with the given configuration
    pub async fn launch(config: RenderConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer");

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| RssForwardError::Render(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            RssForwardError::Render(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {
                // Drive the CDP connection
            }
        });

        Ok(Self {
            browser,
            handler,
            config,
        })
    }

    /// Load `url` and return the rendered document HTML.
    ///
    /// The tab is closed whether loading succeeds, fails or times out.
    pub async fn render(&self, url: &str) -> Result<String> {
        let limit = self.config.timeout();
        let page = tokio::time::timeout(limit, self.browser.new_page("about:blank"))
            .await
            .map_err(|_| self.timed_out(url))?
            .map_err(|e| RssForwardError::Render(format!("Failed to create page: {}", e)))?;

        let loading = page.clone();
        let closing = async move {
            if let Err(e) = page.close().await {
                debug!("Failed to close page {}: {}", url, e);
            }
        };

        with_cleanup(limit, self.load(&loading, url), closing)
            .await
            .ok_or_else(|| self.timed_out(url))?
    }

    async fn load(&self, page: &Page, url: &str) -> Result<String> {
        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| RssForwardError::Render(format!("Failed to set user agent: {}", e)))?;
        }

        page.goto(url)
            .await
            .map_err(|e| RssForwardError::Render(format!("Navigation failed: {}", e)))?;

        // Additional wait for dynamic content
        tokio::time::sleep(self.config.wait_after_load()).await;

        page.content()
            .await
            .map_err(|e| RssForwardError::Render(format!("Failed to read page content: {}", e)))
    }

    fn timed_out(&self, url: &str) -> RssForwardError {
        RssForwardError::Render(format!(
            "Timed out after {}s loading {}",
            self.config.timeout_secs, url
        ))
    }

    /// Shut the browser down and stop its event handler
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
    }
}

/// Run `work` for at most `limit`, then run `cleanup` either way.
/// `None` means the limit was hit.
async fn with_cleanup<T, W, C>(limit: Duration, work: W, cleanup: C) -> Option<T>
where
    W: Future<Output = T>,
    C: Future<Output = ()>,
{
    let outcome = tokio::time::timeout(limit, work).await.ok();
    cleanup.await;
    outcome
}
