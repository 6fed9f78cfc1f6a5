pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Credentials;

pub use http_fetcher::HttpFetcher;

#[derive(Debug)]
pub enum FetchResult {
    /// New content fetched successfully
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// Content not modified (HTTP 304)
    NotModified,
}

/// Conditional-request state for one URL, kept by a generator between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        validators: &Validators,
    ) -> Result<FetchResult>;
}
