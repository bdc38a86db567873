//! Feed ingestion: retrieval, parsing, normalization and aggregation.
//!
//! - [`xml`] - Owned element tree with namespace resolution and the
//!   suffix-based tag lookup
//! - [`dialect`] - RSS 2.0 / Atom / RDF detection and field tables
//! - [`normalize`] - One `<item>`/`<entry>` to an [`Article`]
//! - [`parser`] - Whole document to a [`FeedResult`]
//! - [`fetcher`] - [`Transport`] seam, HTTP client setup and the
//!   single-source fetch
//! - [`aggregate`] - Concurrent multi-source merge
//!
//! # Example
//!
//! ```ignore
//! use feedsift::feed::{Aggregator, AggregateLimits, HttpTransport, SourceFetcher};
//!
//! let fetcher = SourceFetcher::new(HttpTransport::new(reqwest::Client::new()));
//! let feed = fetcher.fetch("https://krebsonsecurity.com/feed/").await?;
//!
//! let aggregator = Aggregator::new(fetcher, AggregateLimits::default());
//! let merged = aggregator.aggregate_all(&sources).await;
//! ```

mod aggregate;
mod dialect;
mod fetcher;
mod normalize;
mod parser;
mod types;
mod xml;

pub use aggregate::{
    merge, sort_newest_first, AggregateLimits, Aggregation, Aggregator, SourceFailure,
};
pub use dialect::Dialect;
pub use fetcher::{build_http_client, FetchError, HttpTransport, SourceFetcher, Transport};
pub use parser::{parse, parse_with_limit, ParseError, DEFAULT_MAX_ITEMS};
pub use types::{
    parse_pub_date, Article, Enclosure, FeedInfo, FeedResult, FeedStatus, Source, ALL_SOURCES_URL,
};
