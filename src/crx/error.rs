#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrxError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid crx: {0}")]
    Format(String),

    #[error("truncated crx: {what} needs {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("malformed crx3 header: {0}")]
    MalformedHeader(String),

    #[error("crx carries no public key")]
    NoPublicKey,

    #[error("zip entry not found: {0}")]
    EntryNotFound(String),

    #[error("zip entry {name}: {reason}")]
    Decompress { name: String, reason: String },

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type CrxResult<T> = Result<T, CrxError>;
