use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by a single call to the remote upload service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Authorization rejected: {0}")]
    Unauthorized(String),

    #[error("Request rejected: status code {status_code}, message: {message}")]
    Rejected {
        status_code: u16,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ServiceError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status_code,
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// Transient failures worth another attempt at the same chunk.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout | ServiceError::Network(_) | ServiceError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_decode() {
            ServiceError::UnexpectedResponse(err.to_string())
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

/// Reason a single upload job ended in `Failed`.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("IO error on {}: {message}", path.display())]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("Session rejected: {0}")]
    SessionRejected(ServiceError),

    #[error("Chunk at offset {offset} failed after {attempts} attempts: {source}")]
    ChunkTransfer {
        offset: u64,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Authorization rejected during transfer: {0}")]
    Unauthorized(String),
}

impl UploadError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Error alias
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
