#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// A dotted path is both a leaf and the parent of another path.
    #[error("mac path conflicts with another entry: {0}")]
    PathConflict(String),

    #[error("invalid mac store: {0}")]
    InvalidStore(String),

    #[error("hmac key rejected: {0}")]
    Key(String),
}

pub type PrefsResult<T> = Result<T, PrefsError>;
