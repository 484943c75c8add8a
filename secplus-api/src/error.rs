use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base url: {0}")]
    BaseUrl(String),
}

impl ApiError {
    /// Whether the failure is worth another attempt. Transport faults
    /// (connect, timeout, dropped connection) are; an explicit rejection
    /// from the backend is not — the request itself was bad or the code
    /// behind it is spent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}
