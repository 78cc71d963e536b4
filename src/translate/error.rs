//! Errors raised while converting between wire formats.

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported content block: {0}")]
    UnsupportedBlock(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("invalid tool schema: {0}")]
    InvalidSchema(String),

    #[error("upstream stream error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;
