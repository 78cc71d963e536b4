//! Crate-level error type.
//!
//! Every component (pool, auth, translate, dispatch) defines its own
//! `thiserror` enum; this module aggregates them into a single
//! `GatewayError` for collaborators that want one error type at the
//! boundary, mirroring the teacher's `AppError`/`ProviderError` split.

use crate::auth::error::BrokerError;
use crate::dispatch::error::DispatchError;
use crate::pool::PoolError;
use crate::translate::error::TranslateError;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// The four client-visible error kinds named in the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimit,
    InvalidRequest,
    AuthenticationError,
    ApiError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::ApiError => "api_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("account pool: {0}")]
    Pool(#[from] PoolError),

    #[error("credential broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("format translator: {0}")]
    Translate(#[from] TranslateError),

    #[error("upstream dispatcher: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Error-kind tag surfaced to the client, per spec §7.
    pub fn error_type(&self) -> ErrorKind {
        match self {
            GatewayError::Pool(PoolError::AllRateLimited { .. }) => ErrorKind::RateLimit,
            GatewayError::Pool(_) => ErrorKind::ApiError,
            GatewayError::Broker(BrokerError::Invalid { .. }) => ErrorKind::AuthenticationError,
            GatewayError::Broker(BrokerError::Auth(_)) => ErrorKind::AuthenticationError,
            GatewayError::Broker(BrokerError::Network(_)) => ErrorKind::ApiError,
            GatewayError::Broker(BrokerError::MalformedResponse(_)) => ErrorKind::ApiError,
            GatewayError::Translate(_) => ErrorKind::InvalidRequest,
            GatewayError::Dispatch(DispatchError::RateLimited { .. }) => ErrorKind::RateLimit,
            GatewayError::Dispatch(DispatchError::Fatal { status, .. }) if *status == 401 => {
                ErrorKind::AuthenticationError
            }
            GatewayError::Dispatch(_) => ErrorKind::ApiError,
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP status code a collaborator would use when surfacing this error.
    pub fn status_code(&self) -> u16 {
        match self.error_type() {
            ErrorKind::RateLimit => 429,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::AuthenticationError => 401,
            ErrorKind::ApiError => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(ErrorKind::RateLimit.as_str(), "rate_limit");
        assert_eq!(ErrorKind::InvalidRequest.as_str(), "invalid_request");
        assert_eq!(
            ErrorKind::AuthenticationError.as_str(),
            "authentication_error"
        );
        assert_eq!(ErrorKind::ApiError.as_str(), "api_error");
    }

    #[test]
    fn test_rate_limit_status_code() {
        let err = GatewayError::Pool(PoolError::AllRateLimited { min_wait_ms: 5000 });
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.error_type(), ErrorKind::RateLimit);
    }
}
