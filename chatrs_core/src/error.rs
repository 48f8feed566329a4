use thiserror::Error;

/// Failures talking to the remote completion service.
///
/// The core never retries these; the caller decides.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Map an HTTP error status and body onto the gateway taxonomy.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited(message),
            _ => Self::Provider { status, message },
        }
    }
}

/// Failures of a session persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error("session serialization error: {0}")]
    Serialization(String),
}
