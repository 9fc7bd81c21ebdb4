use crate::error::FeedError;
use crate::models::{FeedItem, Published};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;

/// Anything that can produce the current feed snapshot, newest first.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedError>;
}

/// Fetches the torznab feed over HTTP
pub struct FeedFetcher {
    client: reqwest::Client,
    url: String,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    /// Fetches the feed and parses it, preserving feed order
    /// Returns an error if the fetch fails or the document is malformed
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedError> {
        tracing::debug!("Fetching feed");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let items = parse_feed(&bytes)?;

        tracing::debug!(count = items.len(), "Parsed feed");
        Ok(items)
    }
}

/// Parses an RSS/torznab document into items, in document order.
///
/// A channel with no items yields an empty vector. A document with no
/// `<channel>` element at all is rejected. Items without a guid, title or
/// `pubDate` are skipped. A `pubDate` in an unknown format is kept verbatim.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<FeedItem>, FeedError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();

    let mut seen_channel = false;
    let mut current_item: Option<ItemBuilder> = None;
    let mut current_element = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "channel" => seen_channel = true,
                    "item" => current_item = Some(ItemBuilder::default()),
                    _ => {
                        if let Some(ref mut item) = current_item {
                            item.read_attributes(&name, &e);
                        }
                    }
                }
                current_element = name;
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "channel" {
                    seen_channel = true;
                }
                if let Some(ref mut item) = current_item {
                    item.read_attributes(&name, &e);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(builder) = current_item.take() {
                        match builder.build() {
                            Ok(item) => items.push(item),
                            Err(reason) => tracing::warn!(%reason, "Skipping feed item"),
                        }
                    }
                }
                current_element.clear();
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut item) = current_item {
                    let text = match e.unescape() {
                        Ok(text) => text.to_string(),
                        Err(_) => String::from_utf8_lossy(&e).to_string(),
                    };
                    item.push_text(&current_element, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(ref mut item) = current_item {
                    let text = String::from_utf8_lossy(&e).to_string();
                    item.push_text(&current_element, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if !seen_channel {
        return Err(FeedError::Parse("missing <channel> element".to_string()));
    }

    Ok(items)
}

/// Parses `pubDate` values. RSS uses RFC 2822; some indexers emit RFC 3339.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    guid: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
    size: Option<String>,
    enclosure_length: Option<String>,
    attributes: HashMap<String, String>,
}

impl ItemBuilder {
    fn push_text(&mut self, element: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let slot = match element {
            "title" => &mut self.title,
            "guid" => &mut self.guid,
            "link" => &mut self.link,
            "pubDate" => &mut self.pub_date,
            "size" => &mut self.size,
            _ => return,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    fn read_attributes(&mut self, element: &str, e: &BytesStart) {
        match element {
            "torznab:attr" | "newznab:attr" => {
                let name = attribute_value(e, b"name");
                let value = attribute_value(e, b"value");
                if let (Some(name), Some(value)) = (name, value) {
                    self.attributes.insert(name, value);
                }
            }
            "enclosure" => {
                self.enclosure_length = attribute_value(e, b"length");
            }
            _ => {}
        }
    }

    fn build(self) -> Result<FeedItem, String> {
        let guid = self.guid.ok_or("item has no <guid>")?.trim().to_string();
        let title = self.title.ok_or_else(|| format!("item {} has no <title>", guid))?;
        let raw_date = self
            .pub_date
            .ok_or_else(|| format!("item {} has no <pubDate>", guid))?;
        let published_at = match parse_pub_date(&raw_date) {
            Some(at) => Published::At(at),
            None => {
                tracing::warn!(%guid, pub_date = %raw_date, "Unrecognised pubDate, keeping it as text");
                Published::Unparsed(raw_date.trim().to_string())
            }
        };

        let size_bytes = self
            .size
            .or(self.enclosure_length)
            .or_else(|| self.attributes.get("size").cloned())
            .and_then(|s| s.trim().parse::<u64>().ok());

        Ok(FeedItem {
            guid,
            title: title.trim().to_string(),
            link: self.link.map(|l| l.trim().to_string()),
            published_at,
            size_bytes,
            extra_attributes: self.attributes,
        })
    }
}

fn attribute_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
