//! Error type shared by every layer of the scraper.

use thiserror::Error;

/// Errors that can occur while logging in, fetching or parsing pages.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport level failure. Retryable by the caller.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Bad credentials, unsolved captcha or a changed login flow.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("session expired, a new login is required")]
    SessionExpired,

    #[error("the portal is in maintenance mode")]
    Maintenance,

    /// The page no longer looks the way the extractor expects.
    #[error("unrecognized page shape: {0}")]
    PageShape(String),

    #[error("unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("{failed}/{total} failed")]
    PartialCrawl { failed: usize, total: usize },

    #[error("unrecognized challenge image (md5 {hash})")]
    UnknownCaptchaImage { hash: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        ScrapeError::PageShape(msg.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ScrapeError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_crawl_message() {
        let err = ScrapeError::PartialCrawl { failed: 2, total: 10 };
        assert_eq!(err.to_string(), "2/10 failed");
    }

    #[test]
    fn test_transient_status() {
        let busy = ScrapeError::Status { url: "u".into(), status: 503 };
        let gone = ScrapeError::Status { url: "u".into(), status: 404 };
        assert!(busy.is_transient());
        assert!(!gone.is_transient());
        assert!(!ScrapeError::SessionExpired.is_transient());
    }
}
