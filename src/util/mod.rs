//! Utility functions shared by the parser, config loader and CLI output.
//!
//! - **Text**: markup stripping and character/width-aware truncation
//! - **Source URLs**: scheme and internal-host checks for configured feeds

mod source_url;
mod text;

pub use source_url::{validate_source_url, SourceUrlError};
pub use text::{display_width, strip_control_chars, strip_markup, truncate_chars, truncate_to_width};
