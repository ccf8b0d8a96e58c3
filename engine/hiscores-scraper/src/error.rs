//! Error taxonomy for the scraper

use thiserror::Error;

/// Result type alias for scraper operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Failures while talking to the hiscores or writing scrape output
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The stats endpoint has no entry for this username (expected, not fatal)
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The request timed out; retried with backoff before escalating
    #[error("server busy")]
    ServerBusy,

    /// Non-2xx response or connection-level failure
    #[error("request failed (status {code:?}): {message}")]
    RequestFailed { code: Option<u16>, message: String },

    /// The ranking page carried the block sentinel
    #[error("IP address blocked by remote")]
    IpAddressBlocked,

    /// Upstream format changed; never retried
    #[error("parsing failed: {0}")]
    ParsingFailed(String),

    /// Page number outside 1..=80000
    #[error("invalid page number {0}")]
    InvalidPage(u32),

    /// Rank range that cannot be scraped
    #[error("invalid rank range {start}..={stop}")]
    InvalidRange { start: u64, stop: u64 },

    /// Unusable scraper configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The exporter stopped accepting records
    #[error("exporter closed")]
    ExporterClosed,

    /// A worker task panicked
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Malformed JSON configuration
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn request_failed(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::RequestFailed { code, message: message.into() }
    }

    /// Errors that end the attempt and warrant an IP reset before retrying
    pub fn is_block_event(&self) -> bool {
        matches!(self, ScrapeError::RequestFailed { .. } | ScrapeError::IpAddressBlocked)
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::ServerBusy
        } else {
            ScrapeError::request_failed(err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_classification() {
        assert!(ScrapeError::IpAddressBlocked.is_block_event());
        assert!(ScrapeError::request_failed(Some(503), "unavailable").is_block_event());
        assert!(!ScrapeError::ServerBusy.is_block_event());
        assert!(!ScrapeError::ParsingFailed("x".into()).is_block_event());
        assert!(!ScrapeError::UserNotFound("x".into()).is_block_event());
    }
}
