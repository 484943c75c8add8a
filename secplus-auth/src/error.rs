use secplus_api::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected by auth backend ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Invalid launch URL: {0}")]
    LaunchUrl(String),
}

impl AuthError {
    /// Transient errors are worth another attempt; everything else is a
    /// definitive answer from the backend or a local bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => AuthError::Network(e.to_string()),
            ApiError::Rejected { status, message } => AuthError::Rejected { status, message },
            ApiError::Malformed(msg) => AuthError::Malformed(msg),
            ApiError::Json(e) => AuthError::Malformed(e.to_string()),
            ApiError::BaseUrl(msg) => AuthError::Configuration(msg),
        }
    }
}
