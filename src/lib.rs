//! Feed ingestion, aggregation and selection for security news sources.
//!
//! - [`feed`] - Fetch, parse and merge RSS 2.0 / Atom / RDF feeds
//! - [`selection`] - Mode and working-set state, fetch supersession and
//!   report gating
//! - [`config`] - TOML configuration and the built-in source list
//! - [`util`] - Text and URL helpers

pub mod config;
pub mod feed;
pub mod selection;
pub mod util;
