//! RSS 2.0 rendering.
//!
//! Plain-text fields go out as escaped text; the item description is HTML and
//! goes out as CDATA. A literal `]]>` inside the description is split across
//! two adjacent CDATA sections (`]]]]><![CDATA[>`), which readers concatenate.

use crate::error::FeedError;
use crate::models::{CanonicalItem, Channel};
use crate::utils::escape_xml;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;
use tracing::{debug, instrument};

const CDATA_END: &str = "]]>";

/// Format a timestamp as an RFC-822 date, always in UTC: `Wed, 24 Dec 2025 10:30:00 +0000`.
pub fn rfc822(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// Drop control characters XML 1.0 does not allow (everything below 0x20
/// except tab, LF and CR).
fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect()
}

fn write_text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<(), FeedError> {
    let text = strip_control(text);
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(&text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Split `text` into pieces that can each be wrapped in CDATA.
///
/// Every `]]>` is cut between `]]` and `>`, so no piece contains the
/// terminator and their concatenation is the input.
pub fn cdata_pieces(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    let mut carry = String::new();
    while let Some(at) = rest.find(CDATA_END) {
        pieces.push(format!("{carry}{}]]", &rest[..at]));
        carry = ">".to_string();
        rest = &rest[at + CDATA_END.len()..];
    }
    pieces.push(format!("{carry}{rest}"));
    pieces
}

fn write_cdata_element<W: Write>(w: &mut Writer<W>, name: &str, html: &str) -> Result<(), FeedError> {
    let html = strip_control(html);
    w.write_event(Event::Start(BytesStart::new(name)))?;
    for piece in cdata_pieces(&html) {
        w.write_event(Event::CData(BytesCData::new(piece.as_str())))?;
    }
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// HTML body of an item description: summary, labelled details, image.
///
/// The summary is passed through as HTML; detail values and the image URL are
/// escaped.
pub fn description_html(item: &CanonicalItem) -> String {
    let mut html = item.summary.clone();
    for (label, value) in &item.details {
        html.push_str(&format!(
            "<br/><strong>{}:</strong> {}",
            escape_xml(label),
            escape_xml(value)
        ));
    }
    if let Some(src) = &item.image_url {
        if !html.is_empty() {
            html.push_str("<br/>");
        }
        html.push_str(&format!("<img src=\"{}\"/>", escape_xml(src)));
    }
    html
}

fn write_item<W: Write>(w: &mut Writer<W>, item: &CanonicalItem) -> Result<(), FeedError> {
    w.write_event(Event::Start(BytesStart::new("item")))?;
    write_text_element(w, "title", &item.title)?;
    write_text_element(w, "link", &item.link)?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", if item.guid_is_permalink { "true" } else { "false" }));
    w.write_event(Event::Start(guid))?;
    w.write_event(Event::Text(BytesText::new(&strip_control(&item.guid))))?;
    w.write_event(Event::End(BytesEnd::new("guid")))?;

    write_text_element(w, "pubDate", &rfc822(&item.published_at))?;
    if !item.category.trim().is_empty() {
        write_text_element(w, "category", &item.category)?;
    }
    write_cdata_element(w, "description", &description_html(item))?;
    w.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

/// Render a complete RSS 2.0 document. Items are emitted in the given order.
#[instrument(level = "debug", skip_all, fields(channel = %channel.title, items = items.len()))]
pub fn render(channel: &Channel, items: &[CanonicalItem]) -> Result<String, FeedError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    write_text_element(&mut writer, "title", &channel.title)?;
    write_text_element(&mut writer, "link", &channel.link)?;
    write_text_element(&mut writer, "description", &channel.description)?;
    write_text_element(&mut writer, "language", &channel.language)?;
    write_text_element(&mut writer, "lastBuildDate", &rfc822(&channel.last_build))?;

    for item in items {
        write_item(&mut writer, item)?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    let xml = String::from_utf8(out).map_err(|e| FeedError::Render(e.to_string()))?;
    debug!(bytes = xml.len(), "Rendered feed");
    Ok(xml)
}
