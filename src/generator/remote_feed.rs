use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::Result;
use crate::domain::{Credentials, GeneratorSpec, Payload};
use crate::feed::render_rss;
use crate::fetcher::{FetchResult, Fetcher, Validators};
use crate::generator::{GenerationContext, Generator, Params};
use crate::normalizer::Normalizer;

pub const KIND: &str = "feed";

/// Re-publishes a remote RSS/Atom/JSON feed as a local RSS document.
///
/// Params: `url` (required), `outfile`, `title`, `limit`, `recent_only`.
pub struct RemoteFeedGenerator {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    url: Url,
    out_file: String,
    title: Option<String>,
    limit: Option<usize>,
    recent_only: bool,
    credentials: Option<Credentials>,
    validators: Validators,
    last_payload: Option<Payload>,
}

impl RemoteFeedGenerator {
    pub fn from_spec(spec: &GeneratorSpec, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        let params = Params::new(spec);
        Ok(Self {
            fetcher,
            url: params.url("url")?,
            out_file: params.out_file("feed.xml")?,
            title: params.str("title")?.map(String::from),
            limit: params.usize("limit")?,
            recent_only: params.bool_or("recent_only", false)?,
            credentials: None,
            validators: Validators::default(),
            last_payload: None,
        })
    }

    fn build_payload(&self, body: &[u8], ctx: &GenerationContext) -> Result<Option<Payload>> {
        let since = ctx
            .recent
            .filter(|_| self.recent_only)
            .map(|recent| recent.with_timezone(&Utc));
        let parsed = match Normalizer::new()
            .since(since)
            .limit(self.limit)
            .parse(self.url.as_str(), body)
        {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {}: {}", self.url, e);
                return Ok(None);
            }
        };

        let channel = parsed.channel(self.title.as_deref(), self.url.as_str());
        info!("Generating {} feed items from {}", parsed.items.len(), self.url);
        let content = render_rss(&channel, &parsed.items)?;
        Ok(Some(Payload::from([(self.out_file.clone(), content)])))
    }
}

#[async_trait]
impl Generator for RemoteFeedGenerator {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<bool> {
        // Public feeds need nothing; protected ones get HTTP basic auth.
        self.credentials = (!credentials.is_empty()).then(|| credentials.clone());
        Ok(true)
    }

    async fn generate(&mut self, ctx: &GenerationContext) -> Result<Option<Payload>> {
        let fetched = self
            .fetcher
            .fetch(self.url.as_str(), self.credentials.as_ref(), &self.validators)
            .await;

        match fetched {
            Ok(FetchResult::NotModified) => {
                debug!("Feed {} not modified", self.url);
                Ok(self.last_payload.clone())
            }
            Ok(FetchResult::Content {
                body,
                etag,
                last_modified,
            }) => {
                let payload = self.build_payload(&body, ctx)?;
                if payload.is_some() {
                    self.validators = Validators {
                        etag,
                        last_modified,
                    };
                    self.last_payload = payload.clone();
                }
                Ok(payload)
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", self.url, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RssForwardError;
    use chrono::{FixedOffset, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Upstream</title>
    <link>https://upstream.example.com</link>
    <description>Upstream feed</description>
    <item>
      <title>New</title>
      <link>https://upstream.example.com/new</link>
      <guid>new</guid>
      <pubDate>Sun, 10 Mar 2024 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Old</title>
      <link>https://upstream.example.com/old</link>
      <guid>old</guid>
      <pubDate>Fri, 01 Mar 2024 08:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    /// Replays canned responses and records the request validators.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<FetchResult>>>,
        seen: Mutex<Vec<(Validators, Option<Credentials>)>>,
    }

    impl ScriptedFetcher {
        fn push(&self, response: Result<FetchResult>) {
            self.responses.lock().unwrap().push_back(response);
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            _url: &str,
            credentials: Option<&Credentials>,
            validators: &Validators,
        ) -> Result<FetchResult> {
            self.seen
                .lock()
                .unwrap()
                .push((validators.clone(), credentials.cloned()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RssForwardError::Other("no response scripted".into())))
        }
    }

    fn content(etag: &str) -> Result<FetchResult> {
        Ok(FetchResult::Content {
            body: RSS.as_bytes().to_vec(),
            etag: Some(etag.into()),
            last_modified: None,
        })
    }

    fn generator(fetcher: Arc<ScriptedFetcher>, params: &str) -> RemoteFeedGenerator {
        let mut spec = GeneratorSpec::new("upstream", KIND);
        spec.params = toml::from_str(params).unwrap();
        RemoteFeedGenerator::from_spec(&spec, fetcher).unwrap()
    }

    const PARAMS: &str = "url = \"https://upstream.example.com/feed.xml\"\noutfile = \"upstream.xml\"";

    #[tokio::test]
    async fn test_generates_named_payload() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(content("\"v1\""));
        let mut gen = generator(fetcher.clone(), PARAMS);

        assert!(gen.authenticate(&Credentials::default()).await.unwrap());
        let payload = gen
            .generate(&GenerationContext::default())
            .await
            .unwrap()
            .unwrap();

        let xml = payload.get("upstream.xml").unwrap();
        assert!(xml.contains("<title>Upstream</title>"));
        assert!(xml.contains("https://upstream.example.com/new"));
        assert!(xml.contains("https://upstream.example.com/old"));
    }

    #[tokio::test]
    async fn test_not_modified_reuses_last_payload() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(content("\"v1\""));
        fetcher.push(Ok(FetchResult::NotModified));
        let mut gen = generator(fetcher.clone(), PARAMS);
        let ctx = GenerationContext::default();

        let first = gen.generate(&ctx).await.unwrap();
        let second = gen.generate(&ctx).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].0, Validators::default());
        assert_eq!(seen[1].0.etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_fetch_error_is_soft_failure() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(Err(RssForwardError::Other("connection refused".into())));
        let mut gen = generator(fetcher, PARAMS);
        let produced = gen.generate(&GenerationContext::default()).await.unwrap();
        assert!(produced.is_none());
    }

    #[tokio::test]
    async fn test_unparseable_body_is_soft_failure() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(Ok(FetchResult::Content {
            body: b"<html>maintenance</html>".to_vec(),
            etag: None,
            last_modified: None,
        }));
        let mut gen = generator(fetcher, PARAMS);
        assert!(gen
            .generate(&GenerationContext::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recent_only_uses_watermark() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(content("\"v1\""));
        let mut gen = generator(
            fetcher,
            "url = \"https://upstream.example.com/feed.xml\"\nrecent_only = true",
        );
        let offset = FixedOffset::east_opt(3600).unwrap();
        let ctx = GenerationContext {
            recent: Some(offset.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()),
        };

        let payload = gen.generate(&ctx).await.unwrap().unwrap();
        let xml = payload.get("feed.xml").unwrap();
        assert!(xml.contains("https://upstream.example.com/new"));
        assert!(!xml.contains("https://upstream.example.com/old"));
    }

    #[tokio::test]
    async fn test_credentials_forwarded() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(content("\"v1\""));
        let mut gen = generator(fetcher.clone(), PARAMS);
        gen.authenticate(&Credentials::new("u", "p")).await.unwrap();
        gen.generate(&GenerationContext::default()).await.unwrap();

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].1, Some(Credentials::new("u", "p")));
    }

    #[test]
    fn test_missing_url_rejected() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let spec = GeneratorSpec::new("upstream", KIND);
        assert!(RemoteFeedGenerator::from_spec(&spec, fetcher).is_err());
    }
}
