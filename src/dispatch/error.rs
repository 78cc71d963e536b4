//! Errors surfaced by the upstream dispatcher.

/// A parsed hint for how long to wait before an upstream rate limit
/// clears, per §4.5's priority order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHint {
    pub reset_in_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("rate limited, retry in {reset_in_ms:?}ms")]
    RateLimited { reset_in_ms: Option<u64> },

    #[error("upstream returned fatal status {status}: {body}")]
    Fatal { status: u16, body: String },

    #[error("all accounts are rate limited, minimum wait {min_wait_ms}ms")]
    AllRateLimited { min_wait_ms: u64 },

    #[error("network error talking to upstream: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no account available: {0}")]
    NoAccount(#[from] crate::pool::PoolError),

    #[error("credential error: {0}")]
    Credential(#[from] crate::auth::error::BrokerError),

    #[error("translation error: {0}")]
    Translate(#[from] crate::translate::error::TranslateError),

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
