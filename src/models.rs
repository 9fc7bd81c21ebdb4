use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `<item>` of the torznab feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable identifier, also the URL of the detail page.
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub published_at: Published,
    pub size_bytes: Option<u64>,
    /// `torznab:attr` name/value pairs (seeders, peers, category...).
    #[serde(default)]
    pub extra_attributes: HashMap<String, String>,
}

impl FeedItem {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.extra_attributes.get(name).map(String::as_str)
    }
}

/// An item's `pubDate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Published {
    At(DateTime<Utc>),
    /// Raw text that matched no known date format.
    Unparsed(String),
}

impl From<DateTime<Utc>> for Published {
    fn from(at: DateTime<Utc>) -> Self {
        Published::At(at)
    }
}

pub const MAGNET_NOT_FOUND: &str = "Magnet link not found";
pub const UNKNOWN_RELEASE_TYPE: &str = "Unknown";

/// Supplementary fields scraped from the detail page.
///
/// `None` means the field could not be found; the default value is what a
/// failed enrichment degrades to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDetails {
    pub magnet_link: Option<String>,
    pub release_type: Option<String>,
}

impl ReleaseDetails {
    pub fn magnet_link_or_sentinel(&self) -> &str {
        self.magnet_link.as_deref().unwrap_or(MAGNET_NOT_FOUND)
    }

    pub fn release_type_or_sentinel(&self) -> &str {
        self.release_type.as_deref().unwrap_or(UNKNOWN_RELEASE_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub item: FeedItem,
    pub details: ReleaseDetails,
}
