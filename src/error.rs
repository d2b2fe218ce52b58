//! Error types for coursegen-client
//!
//! This module provides the error taxonomy shared by the three core components:
//! - Start failures of remote generation jobs (terminal, reported immediately)
//! - Retry exhaustion in the request executor (terminal, reported)
//! - Transfer aborts in the download manager (timeout or cancellation)
//! - Plumbing errors (network, URL parsing, I/O, serialization, configuration)
//!
//! Throttled and deduplicated requests are not errors; see
//! [`Dispatch`](crate::executor::Dispatch). Transient poll failures never leave
//! the orchestrator.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for coursegen-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for coursegen-client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.poll_interval")
        key: Option<String>,
    },

    /// The start call of a remote job failed, so the job never started
    #[error("failed to start job at {path}: {message}")]
    StartFailed {
        /// Start path that was called
        path: String,
        /// HTTP status returned by the server, if a response was received
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// Server answered with a non-success status code
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL or path
        url: String,
    },

    /// A request kept failing after every retry attempt
    #[error("{method} {path} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// HTTP method of the request
        method: String,
        /// Normalized request path
        path: String,
        /// Total number of attempts performed (first try included)
        attempts: u32,
        /// The error returned by the final attempt
        last_error: Box<Error>,
    },

    /// A binary transfer exceeded its abort deadline
    #[error("download of {url} timed out after {timeout:?}")]
    TransferTimeout {
        /// URL being downloaded
        url: String,
        /// Abort deadline that was exceeded
        timeout: Duration,
    },

    /// Operation was cancelled or superseded before it produced an outcome
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A URL could not be parsed or joined
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One failure handed to several coalesced callers
    #[error(transparent)]
    Shared(Arc<Error>),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Returns true if this error ends an operation and is surfaced to the caller.
    ///
    /// Everything the executor, orchestrator and downloader return is terminal;
    /// the distinction matters for errors produced by the transport layer,
    /// which are transient until the component gives up on them.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::StartFailed { .. }
            | Error::RetryExhausted { .. }
            | Error::TransferTimeout { .. }
            | Error::Cancelled(_)
            | Error::Config { .. } => true,
            Error::Shared(inner) => inner.is_terminal(),
            Error::HttpStatus { .. }
            | Error::Network(_)
            | Error::InvalidUrl(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }

    /// HTTP status associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::StartFailed { status, .. } => *status,
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::RetryExhausted { last_error, .. } => last_error.status(),
            Error::Shared(inner) => inner.status(),
            _ => None,
        }
    }

    /// Short message suitable for a user-facing notification
    pub fn user_message(&self) -> String {
        match self {
            Error::StartFailed { status: Some(s), .. } => {
                format!("The job could not be started (HTTP {s})")
            }
            Error::StartFailed { .. } => "The job could not be started".to_string(),
            Error::RetryExhausted { attempts, .. } => {
                format!("The request failed after {attempts} attempts")
            }
            Error::TransferTimeout { .. } => "The download took too long and was aborted".to_string(),
            Error::Cancelled(_) => "The operation was cancelled".to_string(),
            Error::HttpStatus { status, .. } => format!("The server answered with HTTP {status}"),
            Error::Network(_) => "The server could not be reached".to_string(),
            Error::Shared(inner) => inner.user_message(),
            other => other.to_string(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_exhausted_reports_attempts_and_cause() {
        let err = Error::RetryExhausted {
            method: "GET".to_string(),
            path: "courses/1".to_string(),
            attempts: 4,
            last_error: Box::new(Error::HttpStatus {
                status: 503,
                url: "courses/1".to_string(),
            }),
        };

        assert_eq!(
            err.to_string(),
            "GET courses/1 failed after 4 attempts: HTTP 503 from courses/1"
        );
        assert_eq!(err.status(), Some(503));
        assert!(err.is_terminal());
        assert_eq!(err.user_message(), "The request failed after 4 attempts");
    }

    #[test]
    fn transport_errors_are_not_terminal_until_wrapped() {
        let raw = Error::HttpStatus {
            status: 500,
            url: "x".to_string(),
        };
        assert!(!raw.is_terminal());

        let shared = Error::Shared(Arc::new(Error::Cancelled("superseded".to_string())));
        assert!(shared.is_terminal());
        assert_eq!(shared.to_string(), "cancelled: superseded");
    }

    #[test]
    fn start_failed_user_message_includes_status() {
        let err = Error::StartFailed {
            path: "courses/7/slides".to_string(),
            status: Some(404),
            message: "Course not found".to_string(),
        };
        assert_eq!(err.user_message(), "The job could not be started (HTTP 404)");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn config_helper_sets_key() {
        match Error::config("polling.poll_interval", "must be greater than zero") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("polling.poll_interval"));
                assert_eq!(message, "must be greater than zero");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
