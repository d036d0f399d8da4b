#![forbid(unsafe_code)]

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::pak::error::{PakError, PakResult};
use crate::pak::format::is_gzipped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Binary,
}

/// Text means valid UTF-8 without C0 control bytes other than
/// tab, LF, VT, FF and CR.
pub fn classify(bytes: &[u8]) -> ContentKind {
    let has_control = bytes
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0E..=0x1F));
    if has_control || std::str::from_utf8(bytes).is_err() {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

pub fn inflate(id: u16, bytes: &[u8]) -> PakResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| PakError::Decompress {
            id,
            reason: e.to_string(),
        })?;
    Ok(out)
}

pub fn deflate(bytes: &[u8]) -> PakResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// A resource with its gzip framing removed, when it had any.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub gzipped: bool,
    pub content: Vec<u8>,
}

impl Decoded {
    /// Inflates gzip-framed resources; everything else is passed through.
    pub fn from_resource(id: u16, bytes: &[u8]) -> PakResult<Self> {
        if is_gzipped(bytes) {
            Ok(Self {
                gzipped: true,
                content: inflate(id, bytes)?,
            })
        } else {
            Ok(Self {
                gzipped: false,
                content: bytes.to_vec(),
            })
        }
    }

    pub fn kind(&self) -> ContentKind {
        classify(&self.content)
    }

    /// Re-applies the original framing to `content`.
    pub fn encode(&self, content: &[u8]) -> PakResult<Vec<u8>> {
        if self.gzipped {
            deflate(content)
        } else {
            Ok(content.to_vec())
        }
    }
}
