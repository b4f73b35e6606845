use thiserror::Error;

/// Failures surfaced by the API client and the session store.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not signed in or session expired; run `resumeai login` again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Server error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session store error: {0}")]
    Session(String),
}

impl ClientError {
    /// 401/403: polling stops and the caller must sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}
