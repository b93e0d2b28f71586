use std::time::Duration;

use thiserror::Error; // A popular crate for defining errors

/// Marker carried by a task's `last_error` when the job was cancelled under it.
pub const CANCELLED_MARKER: &str = "cancelled";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Job rejected before it started, job state is left untouched.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network connection error: {0}")]
    Network(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("{}", CANCELLED_MARKER)]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Critical system failure: {0}")]
    Fatal(String),
}

impl FetchError {
    /// Network errors, timeouts and non-success statuses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::HttpStatus(_)
        )
    }
}

#[cfg(feature = "local")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::HttpStatus(status.as_u16()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

#[cfg(feature = "local")]
impl From<reqwest_middleware::Error> for FetchError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            reqwest_middleware::Error::Middleware(err) => FetchError::Network(err.to_string()),
        }
    }
}

impl From<opendal::Error> for FetchError {
    fn from(err: opendal::Error) -> Self {
        FetchError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(FetchError::HttpStatus(500).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
        assert!(!FetchError::Storage("disk full".into()).is_transient());
        assert!(!FetchError::Validation("empty".into()).is_transient());
    }

    #[test]
    fn test_cancelled_displays_marker() {
        assert_eq!(FetchError::Cancelled.to_string(), CANCELLED_MARKER);
        assert_eq!(FetchError::HttpStatus(500).to_string(), "Server responded with HTTP 500");
    }
}
