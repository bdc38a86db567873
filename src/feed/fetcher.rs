use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_with_limit, ParseError, DEFAULT_MAX_ITEMS};
use crate::feed::types::{FeedResult, Source};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching one feed.
///
/// Everything except [`FetchError::Parse`] is a transport failure. Every
/// message names the URL that failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP response with a non-2xx status code
    #[error("Failed to fetch {url}. Status: {status} {reason}")]
    Status {
        url: String,
        status: u16,
        reason: String,
    },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Request exceeded the configured timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    /// Response body exceeded the size limit
    #[error("Response from {url} too large")]
    ResponseTooLarge { url: String },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response from {url}: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        url: String,
        expected: u64,
        received: usize,
    },
    /// Body was retrieved but is not a usable feed
    #[error("Error processing feed {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        !matches!(self, FetchError::Parse { .. })
    }
}

/// Retrieves raw feed bytes. Timeouts and proxies are the implementation's
/// business; the fetcher only sees bytes or a [`FetchError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch_text(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_text(url).await
    }
}

/// Shared client for feed requests: pooled connections, at most 3
/// redirects, loops refused.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .user_agent(concat!("feedsift/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// [`Transport`] over a shared `reqwest` client.
///
/// No retries: a failed request is reported once and left to the user.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_FEED_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_text(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
            })?
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, url, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
            })?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
            });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                url: url.to_string(),
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

/// One feed retrieval: transport, then parse.
#[derive(Clone)]
pub struct SourceFetcher<T> {
    transport: T,
    max_items: usize,
}

impl<T: Transport> SourceFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Fetches and parses `url`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Status`] and the other transport variants when the
    ///   body could not be retrieved
    /// - [`FetchError::Parse`] when it was retrieved but is not a feed
    ///
    /// A failed fetch never yields a partial [`FeedResult`].
    pub async fn fetch(&self, url: &str) -> Result<FeedResult, FetchError> {
        let bytes = self.transport.fetch_text(url).await?;
        let text = String::from_utf8_lossy(&bytes);

        let feed = parse_with_limit(&text, url, self.max_items).map_err(|source| {
            tracing::warn!(feed = %url, error = %source, "Feed body is not a valid feed");
            FetchError::Parse {
                url: url.to_string(),
                source,
            }
        })?;

        tracing::debug!(feed = %url, items = feed.items.len(), "Fetched feed");
        Ok(feed)
    }

    pub async fn fetch_source(&self, source: &Source) -> Result<FeedResult, FetchError> {
        self.fetch(&source.url).await
    }
}
