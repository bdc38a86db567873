//! Configuration file parser for ~/.config/feedsift/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{AggregateLimits, Source};
use crate::selection::Settings;
use crate::util::{validate_source_url, SourceUrlError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Built-in Sources
// ============================================================================

/// Security news feeds used when the config file lists none.
const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("The Hacker News", "https://thehackernews.com/feeds/posts/default"),
    ("BleepingComputer", "https://www.bleepingcomputer.com/feed/"),
    ("CISA News", "https://www.cisa.gov/news.xml"),
    ("CISA Blog", "https://www.cisa.gov/cisa/blog.xml"),
    ("CISA All Advisories", "https://www.cisa.gov/cybersecurity-advisories/all.xml"),
    ("CISA ICS Advisories", "https://www.cisa.gov/cybersecurity-advisories/ics-advisories.xml"),
    ("Dark Reading", "https://www.darkreading.com/rss.xml"),
    ("Help Net Security", "https://www.helpnetsecurity.com/feed/"),
    ("CSO Online", "https://www.csoonline.com/feed/"),
    ("Wired Security", "https://www.wired.com/feed/category/security/latest/rss"),
    ("Security Affairs", "https://securityaffairs.co/feed"),
    ("Graham Cluley", "https://grahamcluley.com/feed/"),
    ("Zero Day Initiative", "https://www.zerodayinitiative.com/blog?format=rss"),
    ("Krebs on Security", "https://krebsonsecurity.com/feed/"),
    ("The Record", "https://therecord.media/feed/"),
    ("GBHacker", "https://gbhackers.com/feed/"),
    ("Schneier on Security", "https://www.schneier.com/feed/"),
    ("Troy Hunt", "https://www.troyhunt.com/feed/"),
    ("Cybersecurity News", "https://cybersecuritynews.com/feed/"),
    ("Crowdstrike", "https://www.crowdstrike.com/en-us/blog//feed"),
    ("Palo Alto (Unit 42)", "https://unit42.paloaltonetworks.com/feed/"),
    ("Cisco Security", "https://blogs.cisco.com/security/feed"),
];

pub fn builtin_sources() -> Vec<Source> {
    BUILTIN_SOURCES
        .iter()
        .map(|(name, url)| Source::new(*name, *url))
        .collect()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Background refresh interval for the selected source, in minutes.
    /// 0 = manual refresh only.
    pub refresh_interval_minutes: u64,

    /// Items kept from each parsed feed.
    pub max_items_per_feed: usize,

    /// Articles kept after merging every source.
    pub all_sources_cap: usize,

    /// Articles required before a working-set report can be requested.
    pub min_report_articles: usize,

    /// Newest articles handed to a working-set report.
    pub report_window: usize,

    /// Simultaneous fetches during aggregation.
    pub fetch_concurrency: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Allow sources on loopback or private networks.
    pub allow_private_hosts: bool,

    /// Feed sources in display and merge order.
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 240,
            max_items_per_feed: 15,
            all_sources_cap: 50,
            min_report_articles: 5,
            report_window: 5,
            fetch_concurrency: 10,
            request_timeout_secs: 30,
            allow_private_hosts: false,
            sources: builtin_sources(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "refresh_interval_minutes",
        "max_items_per_feed",
        "all_sources_cap",
        "min_report_articles",
        "report_window",
        "fetch_concurrency",
        "request_timeout_secs",
        "allow_private_hosts",
        "sources",
    ];

    /// `~/.config/feedsift/config.toml`, or `None` without `HOME`.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("feedsift")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Bad sources or zero-sized limits → `Err` naming the offending entry
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML text. Blank text yields defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("max_items_per_feed", self.max_items_per_feed),
            ("min_report_articles", self.min_report_articles),
            ("all_sources_cap", self.all_sources_cap),
            ("report_window", self.report_window),
            ("fetch_concurrency", self.fetch_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let invalid = |reason: String| ConfigError::InvalidSource {
                name: source.name.clone(),
                reason,
            };
            if source.name.trim().is_empty() {
                return Err(invalid("name is empty".to_string()));
            }
            if source.is_sentinel() {
                return Err(invalid(format!("'{}' is reserved", source.url)));
            }
            validate_source_url(&source.url, self.allow_private_hosts)
                .map_err(|e: SourceUrlError| invalid(e.to_string()))?;
            if !seen.insert(source.url.as_str()) {
                return Err(invalid(format!("duplicate URL {}", source.url)));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| Duration::from_secs(self.refresh_interval_minutes * 60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn aggregate_limits(&self) -> AggregateLimits {
        AggregateLimits {
            all_sources_cap: self.all_sources_cap,
            concurrency: self.fetch_concurrency,
        }
    }

    /// Orchestrator settings. A disabled refresh interval maps to the
    /// default so callers that ignore it still get a sane value.
    pub fn selection_settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            min_report_articles: self.min_report_articles,
            report_window: self.report_window,
            refresh_interval: self.refresh_interval().unwrap_or(defaults.refresh_interval),
        }
    }

    /// Looks a source up by exact name, then case-insensitively, then by URL.
    /// "All Sources" resolves to the sentinel.
    pub fn find_source(&self, query: &str) -> Option<Source> {
        let sentinel = Source::all_sources();
        if query.eq_ignore_ascii_case(&sentinel.name) || query == sentinel.url {
            return Some(sentinel);
        }
        self.sources
            .iter()
            .find(|s| s.name == query)
            .or_else(|| {
                self.sources
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(query))
            })
            .or_else(|| self.sources.iter().find(|s| s.url == query))
            .cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================
