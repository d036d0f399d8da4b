#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::pak::error::{PakError, PakResult};
use crate::pak::format::{Alias, PakVersion, ResourceEntry};
use crate::pak::io::{to_u32_offset, write_u16, write_u32, write_u8};

/// One resource handed to the writer, in table order.
pub(crate) struct Slot<'a> {
    pub id: u16,
    pub bytes: &'a [u8],
}

/// Serializes a complete data pack in one forward pass.
///
/// Offsets are derived: the data start comes from the table sizes, then every
/// resource offset is the running sum of the lengths before it. Nothing is
/// patched after the fact, so any number of size changes costs a single copy.
///
/// Returns the new buffer and its resource table (sentinel included).
pub(crate) fn write_pak(
    version: PakVersion,
    encoding: u8,
    slots: &[Slot<'_>],
    sentinel_id: u16,
    aliases: &[Alias],
) -> PakResult<(Vec<u8>, Vec<ResourceEntry>)> {
    if version == PakVersion::V4 && !aliases.is_empty() {
        return Err(PakError::Format("v4 paks cannot carry aliases".into()));
    }
    if version == PakVersion::V5 {
        if slots.len() > u16::MAX as usize {
            return Err(PakError::Format(format!(
                "{} resources exceed the v5 limit",
                slots.len()
            )));
        }
        if aliases.len() > u16::MAX as usize {
            return Err(PakError::Format(format!(
                "{} aliases exceed the v5 limit",
                aliases.len()
            )));
        }
    }

    if let Some(w) = slots.windows(2).find(|w| w[1].id <= w[0].id) {
        return Err(PakError::Format(format!(
            "resource id {} follows {}; ids must be strictly ascending",
            w[1].id, w[0].id
        )));
    }

    let data_start = version.data_start(slots.len(), aliases.len());
    let data_len: usize = slots.iter().map(|s| s.bytes.len()).sum();

    let mut entries = Vec::with_capacity(slots.len() + 1);
    let mut cursor = data_start;
    for s in slots {
        entries.push(ResourceEntry {
            id: s.id,
            offset: to_u32_offset(cursor)?,
        });
        cursor += s.bytes.len();
    }
    entries.push(ResourceEntry {
        id: sentinel_id,
        offset: to_u32_offset(cursor)?,
    });

    let mut out: Vec<u8> = Vec::with_capacity(data_start + data_len);
    write_u32(&mut out, version.as_u32())?;
    write_u8(&mut out, encoding)?;
    match version {
        PakVersion::V4 => write_u32(&mut out, slots.len() as u32)?,
        PakVersion::V5 => {
            out.extend_from_slice(&[0u8; 3]);
            write_u16(&mut out, slots.len() as u16)?;
            write_u16(&mut out, aliases.len() as u16)?;
        }
    }

    for e in &entries {
        write_u16(&mut out, e.id)?;
        write_u32(&mut out, e.offset)?;
    }
    for a in aliases {
        write_u16(&mut out, a.id)?;
        write_u16(&mut out, a.target_index)?;
    }
    debug_assert_eq!(out.len(), data_start);

    for s in slots {
        out.extend_from_slice(s.bytes);
    }

    Ok((out, entries))
}

/// Builds writer slots from the current table, substituting modified bytes.
pub(crate) fn slots_with<'a>(
    raw: &'a [u8],
    entries: &[ResourceEntry],
    mods: &'a HashMap<u16, Vec<u8>>,
) -> Vec<Slot<'a>> {
    entries
        .windows(2)
        .map(|w| {
            let id = w[0].id;
            let bytes = match mods.get(&id) {
                Some(b) => b.as_slice(),
                None => &raw[w[0].offset as usize..w[1].offset as usize],
            };
            Slot { id, bytes }
        })
        .collect()
}
