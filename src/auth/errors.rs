use thiserror::Error;

/// Failure to obtain a usable credential. Fatal to a run that has not started.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider rejected the refresh: {0}")]
    RefreshRejected(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Credential encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Invalid client configuration: {0}")]
    InvalidClient(String),
}
