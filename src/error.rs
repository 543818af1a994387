//! Error taxonomy for a single source's feed-generation run.
//!
//! Only source-level failures live here. Per-item problems (a missing optional
//! field, an unparsable date) are never errors; they resolve to placeholders
//! and are counted in [`crate::normalize::NormalizeStats`].

use thiserror::Error;

/// A failure that aborts one source's run.
///
/// The runner logs it, leaves the previously written feed file untouched and
/// moves on to the next source.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Connection failure, timeout, or body read error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The top-level document could not be parsed, or the upstream flagged
    /// the response as unsuccessful.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The source configuration is unusable (bad selector, bad offset, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render feed: {0}")]
    Render(String),
}

impl FeedError {
    /// `true` for HTTP 403, the status most upstreams use to block scrapers.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, FeedError::Status { status: 403, .. })
    }

    /// `true` for failures a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeedError::Status { status, .. } => *status == 403 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<quick_xml::Error> for FeedError {
    fn from(e: quick_xml::Error) -> Self {
        FeedError::Render(e.to_string())
    }
}

impl From<serde_yaml::Error> for FeedError {
    fn from(e: serde_yaml::Error) -> Self {
        FeedError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_is_transient() {
        let e = FeedError::Status {
            status: 403,
            url: "https://example.com".to_string(),
        };
        assert!(e.is_forbidden());
        assert!(e.is_transient());
    }

    #[test]
    fn test_not_found_is_final() {
        let e = FeedError::Status {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!e.is_forbidden());
        assert!(!e.is_transient());
        assert_eq!(e.to_string(), "HTTP 404 from https://example.com");
    }

    #[test]
    fn test_malformed_is_final() {
        let e = FeedError::MalformedDocument("expected value".to_string());
        assert!(!e.is_transient());
        assert!(e.to_string().contains("expected value"));
    }
}
