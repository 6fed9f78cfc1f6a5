use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, RssForwardError};
use crate::domain::{Credentials, FeedChannel, GeneratorSpec, Payload};
use crate::feed::render_rss;
use crate::fetcher::{FetchResult, Fetcher, Validators};
use crate::generator::{GenerationContext, Generator, Params};
use crate::page::{extract_items, ChromeRenderer, ListSelectors, RenderConfig};

pub const KIND: &str = "html";

#[derive(Debug, Clone, PartialEq)]
enum RenderMode {
    Http,
    Chrome(RenderConfig),
}

/// Builds a feed from a listing page that has no feed of its own.
///
/// Params: `url` and `item` (required), `title_selector`, `link_selector`,
/// `summary_selector`, `outfile`, `title`, `limit`, `render` (`http` or
/// `chrome`) and a `browser` table for chrome rendering.
pub struct HtmlListGenerator {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    url: Url,
    selectors: ListSelectors,
    out_file: String,
    title: Option<String>,
    limit: Option<usize>,
    mode: RenderMode,
    renderer: Option<ChromeRenderer>,
    credentials: Option<Credentials>,
}

impl HtmlListGenerator {
    pub fn from_spec(spec: &GeneratorSpec, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        let params = Params::new(spec);

        let mut selectors = ListSelectors::new(params.required_str("item")?);
        if let Some(title) = params.str("title_selector")? {
            selectors.title = title.to_string();
        }
        if let Some(link) = params.str("link_selector")? {
            selectors.link = link.to_string();
        }
        selectors.summary = params.str("summary_selector")?.map(String::from);
        selectors.validate().map_err(|e| params.error(e))?;

        let mode = match params.string_or("render", "http")?.as_str() {
            "http" => RenderMode::Http,
            "chrome" => {
                let config = match params.table("browser")? {
                    Some(table) => toml::Value::Table(table.clone())
                        .try_into()
                        .map_err(|e| params.error(format!("parameter 'browser': {}", e)))?,
                    None => RenderConfig::default(),
                };
                RenderMode::Chrome(config)
            }
            other => return Err(params.error(format!("unknown render mode '{}'", other))),
        };

        Ok(Self {
            fetcher,
            url: params.url("url")?,
            selectors,
            out_file: params.out_file("feed.xml")?,
            title: params.str("title")?.map(String::from),
            limit: params.usize("limit")?,
            mode,
            renderer: None,
            credentials: None,
        })
    }

    async fn load(&mut self) -> Result<String> {
        match &self.mode {
            RenderMode::Http => {
                let fetched = self
                    .fetcher
                    .fetch(
                        self.url.as_str(),
                        self.credentials.as_ref(),
                        &Validators::default(),
                    )
                    .await?;
                match fetched {
                    FetchResult::Content { body, .. } => {
                        Ok(String::from_utf8_lossy(&body).into_owned())
                    }
                    FetchResult::NotModified => Err(RssForwardError::Other(format!(
                        "unexpected 304 for unconditional request to {}",
                        self.url
                    ))),
                }
            }
            RenderMode::Chrome(config) => {
                if self.renderer.is_none() {
                    debug!("Launching browser for {}", self.url);
                    self.renderer = Some(ChromeRenderer::launch(config.clone()).await?);
                }
                match &self.renderer {
                    Some(renderer) => renderer.render(self.url.as_str()).await,
                    None => Err(RssForwardError::Render("browser not available".into())),
                }
            }
        }
    }
}

#[async_trait]
impl Generator for HtmlListGenerator {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<bool> {
        self.credentials = (!credentials.is_empty()).then(|| credentials.clone());
        Ok(true)
    }

    async fn generate(&mut self, _ctx: &GenerationContext) -> Result<Option<Payload>> {
        let html = match self.load().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to load {}: {}", self.url, e);
                return Ok(None);
            }
        };

        let mut page = extract_items(&html, &self.url, &self.selectors)
            .map_err(RssForwardError::FeedParse)?;
        if page.items.is_empty() {
            warn!(
                "No entries matching '{}' on {}",
                self.selectors.item, self.url
            );
            return Ok(None);
        }
        if let Some(limit) = self.limit {
            page.items.truncate(limit);
        }

        let title = self
            .title
            .clone()
            .or(page.title)
            .unwrap_or_else(|| self.url.to_string());
        let channel = FeedChannel::new(title, self.url.as_str());

        info!("Extracted {} entries from {}", page.items.len(), self.url);
        let content = render_rss(&channel, &page.items)?;
        Ok(Some(Payload::from([(self.out_file.clone(), content)])))
    }

    async fn close(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.close().await;
        }
    }
}
