use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecourseError>;

#[derive(Debug, Error)]
pub enum RecourseError {
    #[error("Response has already been committed")]
    ResponseCommitted,

    #[error("Invalid value for header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Response body is already streaming")]
    BodyStreaming,

    #[error("Filter chain has already been consumed")]
    ChainConsumed,

    #[error("Content resolution failed: {0}")]
    ContentResolution(String),

    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig { key: String, message: String },
}

impl RecourseError {
    pub fn invalid_header(name: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports a write attempted on a committed response.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::ResponseCommitted)
    }
}
