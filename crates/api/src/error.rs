//! Error type shared by every admin API call.

/// Errors that can occur while talking to the admin API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a status other than 200.
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON body: {0}")]
    Body(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status for [`ApiError::Status`], `None` for transport/decoding failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
