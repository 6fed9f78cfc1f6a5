//! RSS 2.0 document writer.
//!
//! Output is a pure function of the channel and items: no build dates or
//! other wall-clock data are written, so unchanged input renders to the same
//! bytes on every cycle.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::app::{Result, RssForwardError};
use crate::domain::{FeedChannel, FeedItem};

pub fn render_rss(channel: &FeedChannel, items: &[FeedItem]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new("rss").with_attributes([("version", "2.0")])),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "link", &channel.link)?;
    text_element(&mut writer, "description", channel.display_description())?;
    if let Some(language) = channel.language.as_deref() {
        text_element(&mut writer, "language", language)?;
    }

    for item in items {
        write_item(&mut writer, item)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| RssForwardError::FeedWrite(e.to_string()))
}

fn write_item(writer: &mut Writer<Vec<u8>>, item: &FeedItem) -> Result<()> {
    emit(writer, Event::Start(BytesStart::new("item")))?;

    text_element(writer, "title", item.display_title())?;
    if let Some(link) = item.link.as_deref() {
        text_element(writer, "link", link)?;
    }

    emit(
        writer,
        Event::Start(BytesStart::new("guid").with_attributes([("isPermaLink", "false")])),
    )?;
    emit(writer, Event::Text(BytesText::new(&item.id)))?;
    emit(writer, Event::End(BytesEnd::new("guid")))?;

    if let Some(published) = item.published_at {
        text_element(writer, "pubDate", &published.to_rfc2822())?;
    }
    if let Some(author) = item.author.as_deref() {
        text_element(writer, "author", author)?;
    }
    if let Some(summary) = item.summary.as_deref() {
        text_element(writer, "description", summary)?;
    }

    emit(writer, Event::End(BytesEnd::new("item")))
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| RssForwardError::FeedWrite(e.to_string()))
}
