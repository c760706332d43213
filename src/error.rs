use thiserror::Error;

/// Failure of a single backend request.
///
/// `Transport` means the request never produced a server response; every other
/// variant means the server answered but did not give us what we asked for.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{message}")]
    Declined { message: String },
    #[error("unexpected response from server: {0}")]
    Decode(String),
    #[error("server returned HTTP {status}")]
    Status { status: u16 },
}

impl ApiError {
    pub fn declined(message: impl Into<String>) -> Self {
        ApiError::Declined {
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}
