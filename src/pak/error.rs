#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PakError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pak: {0}")]
    Format(String),

    #[error("truncated pak: {what} needs {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("resource {id}: gzip inflate failed: {reason}")]
    Decompress { id: u16, reason: String },

    #[error("no resource with id {0}")]
    UnknownResource(u16),

    #[error("export manifest: {0}")]
    Manifest(String),

    #[error("invalid patch pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("writing {} failed (backup restored: {restored}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        restored: bool,
    },

    #[error("path is outside export dir: {0}")]
    Outside(String),
}

impl From<serde_json::Error> for PakError {
    fn from(e: serde_json::Error) -> Self {
        PakError::Manifest(e.to_string())
    }
}

pub type PakResult<T> = Result<T, PakError>;
