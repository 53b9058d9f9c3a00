//! Error types shared by the provider clients and cache backends.

use std::fmt;

use thiserror::Error;

/// Failure class of a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Required credential or setting is missing. Never worth retrying.
    Configuration,
    /// The call did not finish within the provider's timeout.
    Timeout,
    /// Non-2xx response, or the request never got a response.
    Http,
    /// The response body could not be decoded.
    Parse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Configuration => "configuration error",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Http => "http error",
            ProviderErrorKind::Parse => "parse error",
        };
        f.write_str(label)
    }
}

/// Error raised by a provider client. Recovered by the aggregator, which moves
/// on to the next provider in the chain.
#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}{}: {message}", status_suffix(.status))]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl ProviderError {
    pub fn configuration(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Configuration, None, message)
    }

    pub fn timeout(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, None, message)
    }

    pub fn http(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Http, status, message)
    }

    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Parse, None, message)
    }

    fn new(
        provider: &str,
        kind: ProviderErrorKind,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            kind,
            status,
            message: message.into(),
        }
    }

    /// Map a transport-level reqwest failure.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(provider, err.to_string())
        } else if err.is_decode() {
            Self::parse(provider, err.to_string())
        } else {
            Self::http(provider, err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid cache timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status_when_present() {
        let err = ProviderError::http("newsapi", Some(500), "Internal Server Error");
        assert_eq!(
            err.to_string(),
            "newsapi http error (status 500): Internal Server Error"
        );
    }

    #[test]
    fn test_display_without_status() {
        let err = ProviderError::configuration("gnews", "GNEWS_API_KEY is not configured");
        assert_eq!(
            err.to_string(),
            "gnews configuration error: GNEWS_API_KEY is not configured"
        );
        assert_eq!(err.kind, ProviderErrorKind::Configuration);
        assert!(err.status.is_none());
    }

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(ProviderError::timeout("rss", "x").kind, ProviderErrorKind::Timeout);
        assert_eq!(ProviderError::parse("cms", "x").kind, ProviderErrorKind::Parse);
    }
}
