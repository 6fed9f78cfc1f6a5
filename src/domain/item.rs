use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(source_url: &str, entry_key: &str) -> Self {
        Self {
            id: Self::generate_id(source_url, entry_key),
            title: None,
            link: None,
            summary: None,
            author: None,
            published_at: None,
        }
    }

    /// Generate a deterministic ID from the source URL and entry key
    pub fn generate_id(source_url: &str, entry_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_url.as_bytes());
        hasher.update(entry_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Whether the item was published at or after `since`.
    ///
    /// Items without a publication date are always kept.
    pub fn is_recent(&self, since: DateTime<Utc>) -> bool {
        self.published_at.map_or(true, |published| published >= since)
    }
}
