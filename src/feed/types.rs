use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// URL of the "all sources" sentinel. Never fetched.
pub const ALL_SOURCES_URL: &str = "all-sources";

/// A configured feed source. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// The pseudo-source that triggers the all-sources aggregation path.
    pub fn all_sources() -> Self {
        Self::new("All Sources", ALL_SOURCES_URL)
    }

    pub fn is_sentinel(&self) -> bool {
        self.url == ALL_SOURCES_URL
    }
}

/// Attached media reference (RSS `<enclosure>`, Atom `rel="enclosure"` link).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl Enclosure {
    pub fn is_empty(&self) -> bool {
        self.link.is_none() && self.mime_type.is_none() && self.length.is_none()
    }
}

/// A feed item normalized across RSS 2.0, Atom and RDF.
///
/// Every string field degrades to empty rather than being optional, except
/// `guid`, which the normalizer guarantees is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub pub_date: String,
    pub link: String,
    pub guid: String,
    pub author: String,
    pub thumbnail: String,
    pub description: String,
    pub content: String,
    pub enclosure: Enclosure,
    pub categories: Vec<String>,
}

impl Article {
    /// Parsed form of `pub_date`, or `None` when empty or unrecognized.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

/// Parses the date formats feeds use in practice.
///
/// RFC 2822 (RSS), RFC 3339 (Atom, `dc:date`), then a few bare ISO-8601
/// shapes some generators emit without an offset (read as UTC).
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whether a feed result carries items or an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Ok,
    Error,
}

/// Feed-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
    pub url: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub image: String,
}

/// Outcome of one fetch attempt. A value, never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResult {
    pub status: FeedStatus,
    pub feed: FeedInfo,
    pub items: Vec<Article>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeedResult {
    pub fn ok(feed: FeedInfo, items: Vec<Article>) -> Self {
        Self {
            status: FeedStatus::Ok,
            feed,
            items,
            message: None,
        }
    }

    /// An error result for a source whose fetch settled as a failure.
    pub fn error(url: &str, message: impl Into<String>) -> Self {
        Self {
            status: FeedStatus::Error,
            feed: FeedInfo {
                url: url.to_string(),
                ..FeedInfo::default()
            },
            items: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FeedStatus::Ok
    }
}
