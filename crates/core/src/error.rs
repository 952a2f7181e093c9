use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpanscopeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed upstream data: {0}")]
    DataFormat(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SpanscopeError>;
