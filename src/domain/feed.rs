use serde::{Deserialize, Serialize};

/// Channel-level metadata of a generated feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedChannel {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl FeedChannel {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: None,
            language: None,
        }
    }

    /// RSS 2.0 requires a non-empty channel description.
    pub fn display_description(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.title,
        }
    }
}
