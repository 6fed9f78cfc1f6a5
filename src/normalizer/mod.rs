use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Text};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{Result, RssForwardError};
use crate::domain::{FeedChannel, FeedItem};

/// An upstream feed reduced to what gets re-published.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub items: Vec<FeedItem>,
}

impl ParsedFeed {
    /// Channel for re-publishing; `title` overrides the upstream title.
    pub fn channel(&self, title: Option<&str>, link: &str) -> FeedChannel {
        let title = title
            .or(self.title.as_deref())
            .unwrap_or(link)
            .to_string();
        let mut channel = FeedChannel::new(title, link);
        channel.description = self.description.clone();
        channel.language = self.language.clone();
        channel
    }
}

/// Parses RSS 0.9x/1.0/2.0, Atom and JSON Feed, keeping entries in
/// document order.
///
/// `since` drops entries published before the cutoff (undated entries are
/// kept); `limit` caps what is left.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn parse(&self, feed_url: &str, body: &[u8]) -> Result<ParsedFeed> {
        let feed = parser::parse(body).map_err(|e| RssForwardError::FeedParse(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| entry_to_item(feed_url, entry))
            .filter(|item| self.since.map_or(true, |since| item.is_recent(since)))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(ParsedFeed {
            title: feed.title.map(decoded),
            description: feed.description.map(decoded),
            language: feed.language,
            items,
        })
    }
}

fn decoded(text: Text) -> String {
    decode_html_entities(&text.content).into_owned()
}

fn entry_to_item(feed_url: &str, entry: Entry) -> FeedItem {
    let link = entry.links.into_iter().next().map(|l| l.href);
    // Entries without an id are keyed by their link.
    let key = match entry.id.as_str() {
        "" => link.clone().unwrap_or_default(),
        id => id.to_string(),
    };

    let mut item = FeedItem::new(feed_url, &key);
    item.title = entry.title.map(decoded);
    item.link = link;
    item.summary = entry.summary.map(decoded).or_else(|| {
        entry
            .content
            .and_then(|c| c.body)
            .map(|body| decode_html_entities(&body).into_owned())
    });
    item.author = entry.authors.into_iter().next().map(|a| a.name);
    item.published_at = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc));
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BOARD_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>School board</title>
    <description>Announcements for parents</description>
    <language>pl</language>
    <item>
      <title>Parent meeting</title>
      <link>https://school.example.com/news/meeting</link>
      <guid>news-41</guid>
      <pubDate>Tue, 05 Mar 2024 16:00:00 GMT</pubDate>
      <description>Room 12, bring the signed form</description>
    </item>
    <item>
      <title>Winter break</title>
      <link>https://school.example.com/news/break</link>
      <guid>news-40</guid>
      <pubDate>Mon, 12 Feb 2024 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Lunch menu</title>
      <link>https://school.example.com/menu</link>
    </item>
  </channel>
</rss>"#;

    const CLUB_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Chess club</title>
  <subtitle>Results &amp; fixtures</subtitle>
  <entry>
    <title>League round 3</title>
    <link href="https://club.example.com/r3"/>
    <id>urn:club:r3</id>
    <updated>2024-03-02T10:00:00Z</updated>
    <author><name>Marta</name></author>
    <content type="html">Won 4-2 away</content>
  </entry>
</feed>"#;

    const URL: &str = "https://school.example.com/rss";

    #[test]
    fn test_rss_channel_and_entries() {
        let parsed = Normalizer::new().parse(URL, BOARD_RSS.as_bytes()).unwrap();

        assert_eq!(parsed.title.as_deref(), Some("School board"));
        assert_eq!(parsed.language.as_deref(), Some("pl"));
        let titles: Vec<_> = parsed.items.iter().map(|i| i.display_title()).collect();
        assert_eq!(titles, vec!["Parent meeting", "Winter break", "Lunch menu"]);
        assert_eq!(
            parsed.items[0].summary.as_deref(),
            Some("Room 12, bring the signed form")
        );
        assert!(parsed.items[2].published_at.is_none());
    }

    #[test]
    fn test_atom_content_used_as_summary() {
        let parsed = Normalizer::new()
            .parse("https://club.example.com/atom", CLUB_ATOM.as_bytes())
            .unwrap();

        assert_eq!(parsed.description.as_deref(), Some("Results & fixtures"));
        let item = &parsed.items[0];
        assert_eq!(item.author.as_deref(), Some("Marta"));
        assert_eq!(item.summary.as_deref(), Some("Won 4-2 away"));
        assert_eq!(item.link.as_deref(), Some("https://club.example.com/r3"));
    }

    #[test]
    fn test_since_keeps_recent_and_undated() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let parsed = Normalizer::new()
            .since(Some(since))
            .parse(URL, BOARD_RSS.as_bytes())
            .unwrap();

        let titles: Vec<_> = parsed.items.iter().map(|i| i.display_title()).collect();
        assert_eq!(titles, vec!["Parent meeting", "Lunch menu"]);
    }

    #[test]
    fn test_limit_applies_after_since() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let parsed = Normalizer::new()
            .since(Some(since))
            .limit(Some(1))
            .parse(URL, BOARD_RSS.as_bytes())
            .unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].display_title(), "Parent meeting");
    }

    #[test]
    fn test_ids_stable_and_keyed_by_source() {
        let first = Normalizer::new().parse(URL, BOARD_RSS.as_bytes()).unwrap();
        let again = Normalizer::new().parse(URL, BOARD_RSS.as_bytes()).unwrap();
        let elsewhere = Normalizer::new()
            .parse("https://mirror.example.com/rss", BOARD_RSS.as_bytes())
            .unwrap();

        assert_eq!(first.items[0].id, again.items[0].id);
        assert_ne!(first.items[0].id, elsewhere.items[0].id);
        assert_ne!(first.items[0].id, first.items[1].id);
    }

    #[test]
    fn test_channel_title_precedence() {
        let parsed = Normalizer::new().parse(URL, BOARD_RSS.as_bytes()).unwrap();
        assert_eq!(parsed.channel(Some("Mine"), URL).title, "Mine");
        assert_eq!(parsed.channel(None, URL).title, "School board");
        assert_eq!(ParsedFeed::default().channel(None, URL).title, URL);
        assert_eq!(
            parsed.channel(None, URL).description.as_deref(),
            Some("Announcements for parents")
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = Normalizer::new().parse(URL, b"not a feed").unwrap_err();
        assert!(matches!(err, RssForwardError::FeedParse(_)));
    }
}
