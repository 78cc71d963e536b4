//! Error types for the credential broker.
//!
//! Grounded on `gemini/error.rs`'s `Error`/`AuthError` split: network
//! failures never mark an account invalid, permanent failures do.

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("token expired")]
    TokenExpired,
    #[error("refresh token invalid or revoked")]
    InvalidGrant,
    #[error("project discovery failed: {0}")]
    ProjectDiscovery(String),
}

/// Errors surfaced by the credential broker.
///
/// `Network` is always transient (dispatcher fails over to another
/// account without marking this one invalid); `Invalid` is permanent
/// (the pool marks the account invalid with the carried reason).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("network error talking to token/discovery endpoint: {0}")]
    Network(#[from] reqwest::Error),

    #[error("permanent credential failure: {reason}")]
    Invalid { reason: String },

    #[error("malformed response from token endpoint: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl BrokerError {
    pub fn is_network(&self) -> bool {
        matches!(self, BrokerError::Network(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BrokerError::Invalid { .. } | BrokerError::MalformedResponse(_) | BrokerError::Auth(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let invalid = BrokerError::Invalid {
            reason: "revoked".into(),
        };
        assert!(invalid.is_permanent());
        assert!(!invalid.is_network());
    }

    #[test]
    fn test_invalid_grant_is_permanent() {
        let err = BrokerError::Auth(AuthError::InvalidGrant);
        assert!(err.is_permanent());
        assert!(!err.is_network());
    }
}
