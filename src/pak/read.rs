#![forbid(unsafe_code)]

use std::io::Cursor;

use tracing::warn;

use crate::pak::error::{PakError, PakResult};
use crate::pak::format::{Alias, PakVersion, ResourceEntry, ALIAS_ENTRY_LEN, RESOURCE_ENTRY_LEN};
use crate::pak::io::{ensure_len, read_exact, read_u16, read_u32, read_u8};

/// Tables decoded from the front of a data pack.
#[derive(Debug)]
pub(crate) struct Tables {
    pub version: PakVersion,
    pub encoding: u8,
    /// Resource entries including the trailing sentinel.
    pub entries: Vec<ResourceEntry>,
    pub aliases: Vec<Alias>,
}

pub(crate) fn read_tables(buf: &[u8]) -> PakResult<Tables> {
    ensure_len("version", 4, buf.len())?;
    let mut cur = Cursor::new(buf);

    let version = PakVersion::from_u32(read_u32(&mut cur)?)?;
    ensure_len("header", version.header_len(), buf.len())?;

    let encoding = read_u8(&mut cur)?;
    let (resource_count, alias_count) = match version {
        PakVersion::V4 => (read_u32(&mut cur)? as usize, 0usize),
        PakVersion::V5 => {
            let _padding = read_exact::<3>(&mut cur)?;
            let resources = read_u16(&mut cur)? as usize;
            let aliases = read_u16(&mut cur)? as usize;
            (resources, aliases)
        }
    };

    // Check the declared table sizes against the buffer before allocating.
    let resource_table = (resource_count + 1)
        .checked_mul(RESOURCE_ENTRY_LEN)
        .ok_or_else(|| PakError::Format("resource count overflows".into()))?;
    ensure_len(
        "resource table",
        version.header_len() + resource_table,
        buf.len(),
    )?;
    let data_start = version.data_start(resource_count, alias_count);
    ensure_len("alias table", data_start, buf.len())?;

    let mut entries = Vec::with_capacity(resource_count + 1);
    for _ in 0..=resource_count {
        let id = read_u16(&mut cur)?;
        let offset = read_u32(&mut cur)?;
        entries.push(ResourceEntry { id, offset });
    }
    check_ids(&entries[..resource_count])?;

    let mut aliases = Vec::with_capacity(alias_count);
    for _ in 0..alias_count {
        let id = read_u16(&mut cur)?;
        let target_index = read_u16(&mut cur)?;
        if target_index as usize >= resource_count {
            return Err(PakError::Format(format!(
                "alias {id} targets index {target_index} of {resource_count}"
            )));
        }
        aliases.push(Alias { id, target_index });
    }
    debug_assert_eq!(cur.position() as usize, data_start);
    debug_assert_eq!(ALIAS_ENTRY_LEN * alias_count + version.header_len() + resource_table, data_start);

    check_offsets(&entries, data_start, buf.len())?;

    Ok(Tables {
        version,
        encoding,
        entries,
        aliases,
    })
}

/// Real resource ids must be strictly ascending; Chromium binary-searches the
/// table. The sentinel is not included.
fn check_ids(entries: &[ResourceEntry]) -> PakResult<()> {
    for w in entries.windows(2) {
        if w[1].id <= w[0].id {
            return Err(PakError::Format(format!(
                "resource id {} follows {}; ids must be strictly ascending",
                w[1].id, w[0].id
            )));
        }
    }
    Ok(())
}

fn check_offsets(entries: &[ResourceEntry], data_start: usize, len: usize) -> PakResult<()> {
    let mut prev = data_start;
    for e in entries {
        let off = e.offset as usize;
        if off < prev {
            return Err(PakError::Format(format!(
                "resource {} offset {off} precedes {prev}",
                e.id
            )));
        }
        if off > len {
            return Err(PakError::Truncated {
                what: "resource data",
                needed: off,
                available: len,
            });
        }
        prev = off;
    }

    if let Some(sentinel) = entries.last() {
        if (sentinel.offset as usize) < len {
            warn!(
                end = sentinel.offset,
                len,
                "pak has trailing bytes after the sentinel; they are dropped on rewrite"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_header(count: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&4u32.to_le_bytes());
        b.push(1);
        b.extend_from_slice(&count.to_le_bytes());
        b
    }

    #[test]
    fn table_running_past_end_is_truncation() {
        let mut b = v4_header(3);
        b.extend_from_slice(&[0u8; 6]);
        match read_tables(&b) {
            Err(PakError::Truncated { what, .. }) => assert_eq!(what, "resource table"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decreasing_offsets_are_rejected() {
        let mut b = v4_header(1);
        // data starts at 9 + 12 = 21
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&23u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&22u32.to_le_bytes());
        b.extend_from_slice(b"xy");
        assert!(matches!(read_tables(&b), Err(PakError::Format(_))));
    }

    #[test]
    fn descending_ids_are_rejected() {
        let mut b = v4_header(2);
        // data starts at 9 + 18 = 27
        b.extend_from_slice(&20u16.to_le_bytes());
        b.extend_from_slice(&27u32.to_le_bytes());
        b.extend_from_slice(&10u16.to_le_bytes());
        b.extend_from_slice(&28u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&29u32.to_le_bytes());
        b.extend_from_slice(b"tx");
        match read_tables(&b) {
            Err(PakError::Format(msg)) => assert!(msg.contains("ascending"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn alias_target_must_exist() {
        let mut b = Vec::new();
        b.extend_from_slice(&5u32.to_le_bytes());
        b.push(1);
        b.extend_from_slice(&[0, 0, 0]);
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        let start = PakVersion::V5.data_start(1, 1) as u32;
        b.extend_from_slice(&7u16.to_le_bytes());
        b.extend_from_slice(&start.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&(start + 1).to_le_bytes());
        b.extend_from_slice(&8u16.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        b.push(b'x');
        assert!(matches!(read_tables(&b), Err(PakError::Format(_))));
    }
}
