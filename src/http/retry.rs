//! Retry policy for network operations.
//!
//! Only timeouts are retried. Every other failure, including server errors
//! and refused connections, surfaces on the first attempt.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of attempts for one network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// HTTP status failures, classified for callers that branch on them.
#[derive(Debug, Error, PartialEq)]
pub enum NonRetryableError {
    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Any other unsuccessful status
    #[error("HTTP {status} error for {url}")]
    Status { status: u16, url: String },
}

/// Map an error from `error_for_status()` to its [`NonRetryableError`] kind.
///
/// Errors without a status (transport failures) are passed through untouched.
pub fn classify_status(error: reqwest::Error) -> anyhow::Error {
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_default();
    match error.status() {
        Some(StatusCode::NOT_FOUND) => NonRetryableError::NotFound(url).into(),
        Some(status) => NonRetryableError::Status {
            status: status.as_u16(),
            url,
        }
        .into(),
        None => error.into(),
    }
}

/// Whether an error is a timeout somewhere in its chain.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
    })
}
