//! Generator error types.
//!
//! All generator operations return [`Result<T>`] with [`GeneratorError`].
//! Every failure is classified transient or terminal via
//! [`GeneratorError::is_transient`]; the retry wrapper only retries
//! transient failures.

use thiserror::Error;

/// Errors from a generator collaborator.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The HTTP request to the collaborator failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The collaborator is throttling requests (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The collaborator has not been configured (e.g. missing API key).
    #[error("generator not configured: {0}")]
    NotConfigured(String),

    /// The collaborator returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The call exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// An HTTP-level error from reqwest.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeneratorError {
    /// Whether a retry of the same call may succeed.
    ///
    /// HTTP 5xx, rate limits, timeouts, and network-level failures are
    /// transient; auth, configuration, and parse failures are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            GeneratorError::RateLimited { .. } => true,
            GeneratorError::Timeout => true,
            GeneratorError::Http(_) => true,
            GeneratorError::RequestFailed(msg) => {
                msg.starts_with("HTTP 500")
                    || msg.starts_with("HTTP 502")
                    || msg.starts_with("HTTP 503")
                    || msg.starts_with("HTTP 504")
            }
            GeneratorError::AuthFailed(_)
            | GeneratorError::NotConfigured(_)
            | GeneratorError::InvalidResponse(_)
            | GeneratorError::Json(_) => false,
        }
    }
}

/// A convenience type alias for generator operations.
pub type Result<T> = std::result::Result<T, GeneratorError>;
