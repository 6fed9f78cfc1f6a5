//! Listing page loading and entry extraction for HTML-scraping generators.
//!
//! ```text
//! URL → (HTTP body | ChromeRenderer) → HTML → extract_items → FeedItems
//! ```

mod chrome;
mod config;
mod extractor;

pub use chrome::ChromeRenderer;
pub use config::RenderConfig;
pub use extractor::{extract_items, ExtractedPage, ListSelectors};
