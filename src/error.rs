//! Custom error types for scholar-badges.
//!
//! Every fallible library function returns `Result<T, MetricsError>`. The
//! fetcher and patcher absorb these at their boundaries, so only the CLI
//! ever sees one surface.

use std::time::Duration;
use thiserror::Error;

/// Main error type for scholar-badges operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the provider, with the `Retry-After` seconds if sent
    #[error(
        "Rate limited{}",
        .0.map(|secs| format!(", retry after {}s", secs)).unwrap_or_default()
    )]
    RateLimited(Option<u64>),

    /// Provider returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Status description
        message: String,
    },

    /// CAPTCHA detected
    #[error("CAPTCHA detected, please refresh cookies or rotate proxies")]
    Captcha,

    /// The page carried no profile data for the identifier
    #[error("No profile data found for '{0}'")]
    ProfileNotFound(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Worker exceeded the hard timeout and was killed
    #[error("Worker timed out after {0:?}")]
    Timeout(Duration),

    /// Worker exited unsuccessfully or produced unusable output
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias using `MetricsError`
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| MetricsError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message() {
        assert_eq!(
            MetricsError::RateLimited(Some(30)).to_string(),
            "Rate limited, retry after 30s"
        );
        assert_eq!(MetricsError::RateLimited(None).to_string(), "Rate limited");
    }
}
