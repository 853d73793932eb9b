//! Session client error types.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the session client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for failures worth retrying with backoff: transport errors,
    /// server errors, and rate limiting. 401 is excluded; it takes the
    /// re-authentication path instead.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// True when the failure is an authentication problem.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        match self {
            ClientError::Auth(_) => true,
            ClientError::Api { status, .. } => *status == 401,
            _ => false,
        }
    }
}
