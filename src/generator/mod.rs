//! Content generators: one implementation per kind of source.
//!
//! A [`Generator`] authenticates once when the registry is built, then
//! produces a [`Payload`] of named feed documents every cycle. Generators are
//! created through the [`GeneratorCatalog`], a static table of factories
//! keyed by the `generator` name used in the config.

pub mod html_list;
pub mod params;
pub mod remote_feed;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::app::{Result, RssForwardError};
use crate::domain::{Credentials, GeneratorSpec, Payload};
use crate::fetcher::Fetcher;

pub use html_list::HtmlListGenerator;
pub use params::Params;
pub use remote_feed::RemoteFeedGenerator;

/// Per-cycle input shared by all generators.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// Watermark read at the start of the cycle, if one was stored.
    pub recent: Option<DateTime<FixedOffset>>,
}

#[async_trait]
pub trait Generator: Send {
    /// Establish session state. `Ok(false)` means the credentials were refused.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<bool>;

    /// Fetch the source and build feed documents.
    ///
    /// `Ok(None)` or an empty payload means nothing was produced this cycle.
    /// Recoverable network and parse failures should end up here rather
    /// than as `Err`.
    async fn generate(&mut self, ctx: &GenerationContext) -> Result<Option<Payload>>;

    /// Release sessions and drivers. Must be safe to call at any point.
    async fn close(&mut self) {}
}

pub type GeneratorFactory =
    Arc<dyn Fn(&GeneratorSpec) -> Result<Box<dyn Generator>> + Send + Sync>;

/// Static registration table: generator kind → factory.
#[derive(Clone, Default)]
pub struct GeneratorCatalog {
    factories: BTreeMap<String, GeneratorFactory>,
}

impl GeneratorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the generators shipped in this crate.
    pub fn builtin(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        let mut catalog = Self::new();

        let feed_fetcher = fetcher.clone();
        catalog.register(remote_feed::KIND, move |spec| {
            let generator = RemoteFeedGenerator::from_spec(spec, feed_fetcher.clone())?;
            Ok(Box::new(generator) as Box<dyn Generator>)
        });

        catalog.register(html_list::KIND, move |spec| {
            let generator = HtmlListGenerator::from_spec(spec, fetcher.clone())?;
            Ok(Box::new(generator) as Box<dyn Generator>)
        });

        catalog
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&GeneratorSpec) -> Result<Box<dyn Generator>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, spec: &GeneratorSpec) -> Result<Box<dyn Generator>> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| RssForwardError::Generator {
                id: spec.id.clone(),
                reason: format!("unknown generator kind '{}'", spec.kind),
            })?;
        factory(spec)
    }
}

impl fmt::Debug for GeneratorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
