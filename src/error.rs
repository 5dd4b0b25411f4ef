// Typed error taxonomy for the tutoring core.
//
// Transient provider failures never appear here: the resilient caller
// converts them into fallback text before they can reach an operation's
// return type. What remains are genuine bug/operator classes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input was rejected before any provider work.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Provider configuration is unusable (missing key, unknown entry).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-retryable provider failure: unexpected 4xx/5xx or a response
    /// body missing the expected text path. Indicates a bug, not load.
    #[error("provider '{provider}' failed permanently ({detail})")]
    PermanentProvider {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    /// Persistence-layer failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
