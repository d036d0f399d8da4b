#![forbid(unsafe_code)]

use crate::pak::error::{PakError, PakResult};

/// First two bytes of a gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `u16 id` + `u32 offset`.
pub(crate) const RESOURCE_ENTRY_LEN: usize = 6;

/// `u16 id` + `u16 target_index`.
pub(crate) const ALIAS_ENTRY_LEN: usize = 4;

/// Id written for the end-of-data sentinel when building a fresh archive.
pub(crate) const SENTINEL_ID: u16 = 0;

/// Data pack layouts understood by this codec.
///
/// v4:
/// - [u32 version][u8 encoding][u32 resource_count]
/// - (resource_count + 1) x [u16 id][u32 offset]
///
/// v5:
/// - [u32 version][u8 encoding][u8 padding[3]][u16 resource_count][u16 alias_count]
/// - (resource_count + 1) x [u16 id][u32 offset]
/// - alias_count x [u16 id][u16 target_index]
///
/// Resource bytes follow the tables, concatenated in table order. The last
/// table entry is a sentinel whose offset marks the end of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PakVersion {
    V4,
    V5,
}

impl PakVersion {
    pub fn from_u32(v: u32) -> PakResult<Self> {
        match v {
            4 => Ok(PakVersion::V4),
            5 => Ok(PakVersion::V5),
            other => Err(PakError::Format(format!("unsupported version {other}"))),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            PakVersion::V4 => 4,
            PakVersion::V5 => 5,
        }
    }

    pub(crate) fn header_len(self) -> usize {
        match self {
            PakVersion::V4 => 4 + 1 + 4,
            PakVersion::V5 => 4 + 1 + 3 + 2 + 2,
        }
    }

    /// Byte offset of the first resource for the given table sizes.
    pub(crate) fn data_start(self, resource_count: usize, alias_count: usize) -> usize {
        self.header_len()
            + (resource_count + 1) * RESOURCE_ENTRY_LEN
            + alias_count * ALIAS_ENTRY_LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceEntry {
    pub id: u16,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
    pub id: u16,
    pub target_index: u16,
}

/// Public view of a resource (for listings, inspectors, etc.).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: u16,
    pub offset: u32,
    pub len: usize,
    pub gzipped: bool,
}

pub fn is_gzipped(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_start_accounts_for_sentinel_and_aliases() {
        assert_eq!(PakVersion::V4.data_start(3, 0), 9 + 4 * 6);
        assert_eq!(PakVersion::V5.data_start(3, 2), 12 + 4 * 6 + 2 * 4);
    }

    #[test]
    fn rejects_unknown_versions() {
        assert!(PakVersion::from_u32(3).is_err());
        assert_eq!(PakVersion::from_u32(5).unwrap(), PakVersion::V5);
    }
}
