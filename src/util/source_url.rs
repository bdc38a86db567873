use std::net::IpAddr;

use thiserror::Error;
use url::Url;

/// Why a configured source URL was refused.
#[derive(Debug, Error)]
pub enum SourceUrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private or loopback host not allowed: {0}")]
    PrivateHost(String),
}

/// Checks that a feed URL is fetchable over HTTP(S).
///
/// Unless `allow_private` is set, loopback, link-local, RFC 1918 and
/// unique-local addresses are refused so a shared config cannot point the
/// fetcher at internal services.
pub fn validate_source_url(raw: &str, allow_private: bool) -> Result<Url, SourceUrlError> {
    let url = Url::parse(raw.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceUrlError::UnsupportedScheme(url.scheme().to_string()));
    }
    if allow_private {
        return Ok(url);
    }

    let Some(host) = url.host_str() else {
        return Ok(url);
    };
    if host.eq_ignore_ascii_case("localhost") {
        return Err(SourceUrlError::PrivateHost(host.to_string()));
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_internal(&ip) {
            return Err(SourceUrlError::PrivateHost(ip.to_string()));
        }
    }
    Ok(url)
}

fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // fc00::/7
                || (first & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}
