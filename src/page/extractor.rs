use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::FeedItem;

/// CSS selectors describing a listing page.
///
/// `item` matches one element per entry; the other selectors are evaluated
/// inside each matched element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSelectors {
    pub item: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
}

impl ListSelectors {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            title: "a".to_string(),
            link: "a[href]".to_string(),
            summary: None,
        }
    }

    /// Check that every selector parses.
    pub fn validate(&self) -> Result<(), String> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<CompiledSelectors, String> {
        Ok(CompiledSelectors {
            item: parse_selector(&self.item)?,
            title: parse_selector(&self.title)?,
            link: parse_selector(&self.link)?,
            summary: self.summary.as_deref().map(parse_selector).transpose()?,
        })
    }
}

struct CompiledSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    summary: Option<Selector>,
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector '{}': {:?}", selector, e))
}

/// Entries found on a listing page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// Extract feed items from listing HTML. Relative links resolve against `base`.
///
/// Entries with neither a title nor a link are skipped.
pub fn extract_items(
    html: &str,
    base: &Url,
    selectors: &ListSelectors,
) -> Result<ExtractedPage, String> {
    let compiled = selectors.compile()?;
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next().map(element_text))
        .filter(|t| !t.is_empty());

    let items = document
        .select(&compiled.item)
        .filter_map(|element| extract_item(element, base, &compiled))
        .collect();

    Ok(ExtractedPage { title, items })
}

fn extract_item(element: ElementRef<'_>, base: &Url, selectors: &CompiledSelectors) -> Option<FeedItem> {
    let title = element
        .select(&selectors.title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty());

    let link = element
        .select(&selectors.link)
        .next()
        .or_else(|| (element.value().name() == "a").then_some(element))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(|u| u.to_string());

    let key = link.clone().or_else(|| title.clone())?;

    let mut item = FeedItem::new(base.as_str(), &key);
    item.title = title;
    item.link = link;
    item.summary = selectors
        .summary
        .as_ref()
        .and_then(|s| element.select(s).next())
        .map(element_text)
        .filter(|t| !t.is_empty());
    Some(item)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
