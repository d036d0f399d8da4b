#![forbid(unsafe_code)]

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::DeflateDecoder;
use flate2::Crc;
use tracing::debug;
use zip::ZipArchive;

use crate::crx::error::{CrxError, CrxResult};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

const LOCAL_HEADER_LEN: usize = 30;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

fn u16_at(b: &[u8], at: usize) -> Option<u16> {
    b.get(at..at + 2).map(|s| u16::from_le_bytes([s[0], s[1]]))
}

fn u32_at(b: &[u8], at: usize) -> Option<u32> {
    b.get(at..at + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Location of one entry's compressed bytes inside the ZIP.
#[derive(Debug)]
struct LocalEntry<'a> {
    name: &'a [u8],
    method: u16,
    crc32: u32,
    data: &'a [u8],
    /// Offset of whatever follows the entry (next header or central directory).
    next: usize,
}

fn read_local_entry(zip: &[u8], pos: usize) -> CrxResult<LocalEntry<'_>> {
    if zip.len() < pos + LOCAL_HEADER_LEN {
        return Err(CrxError::Truncated {
            what: "zip local file header",
            needed: pos + LOCAL_HEADER_LEN,
            available: zip.len(),
        });
    }
    let field = |off: usize| u16_at(zip, pos + off).unwrap_or_default();
    let flags = field(6);
    let method = field(8);
    let crc32 = u32_at(zip, pos + 14).unwrap_or_default();
    let compressed = u32_at(zip, pos + 18).unwrap_or_default() as usize;
    let name_len = field(26) as usize;
    let extra_len = field(28) as usize;

    let name_start = pos + LOCAL_HEADER_LEN;
    let data_start = name_start + name_len + extra_len;
    if data_start > zip.len() {
        return Err(CrxError::Truncated {
            what: "zip entry name",
            needed: data_start,
            available: zip.len(),
        });
    }
    let name = &zip[name_start..name_start + name_len];
    let deferred = flags & FLAG_DATA_DESCRIPTOR != 0;

    if deferred && compressed == 0 {
        let (data_end, crc32, next) = scan_for_entry_end(zip, data_start)?;
        return Ok(LocalEntry {
            name,
            method,
            crc32,
            data: &zip[data_start..data_end],
            next,
        });
    }

    let data_end = data_start + compressed;
    if data_end > zip.len() {
        return Err(CrxError::Truncated {
            what: "zip entry data",
            needed: data_end,
            available: zip.len(),
        });
    }
    let mut next = data_end;
    let mut crc = crc32;
    if deferred {
        let with_sig = u32_at(zip, next) == Some(DATA_DESCRIPTOR_SIG);
        let crc_at = if with_sig { next + 4 } else { next };
        if crc == 0 {
            crc = u32_at(zip, crc_at).unwrap_or_default();
        }
        next = crc_at + 12;
    }

    Ok(LocalEntry {
        name,
        method,
        crc32: crc,
        data: &zip[data_start..data_end],
        next,
    })
}

/// Sizes were deferred to a trailing data descriptor, so walk forward until
/// something that must follow the entry shows up:
/// - a signed descriptor whose compressed-size field equals the distance
///   covered so far, or
/// - the next local header / central directory, preceded by an unsigned
///   12-byte descriptor whose compressed-size field matches as well.
///
/// Signatures that occur inside the entry data fail the size check and are
/// skipped.
///
/// Returns `(data_end, crc32, next)`.
fn scan_for_entry_end(zip: &[u8], data_start: usize) -> CrxResult<(usize, u32, usize)> {
    let mut i = data_start;
    while i + 4 <= zip.len() {
        if zip[i] != b'P' || zip[i + 1] != b'K' {
            i += 1;
            continue;
        }
        match u32_at(zip, i) {
            Some(DATA_DESCRIPTOR_SIG)
                if u32_at(zip, i + 8).map(|n| n as usize) == Some(i - data_start) =>
            {
                let crc = u32_at(zip, i + 4).unwrap_or_default();
                return Ok((i, crc, i + 16));
            }
            Some(LOCAL_HEADER_SIG | CENTRAL_HEADER_SIG | END_OF_CENTRAL_SIG)
                if i >= data_start + 12
                    && u32_at(zip, i - 8).map(|n| n as usize) == Some(i - 12 - data_start) =>
            {
                let data_end = i - 12;
                let crc = u32_at(zip, data_end).unwrap_or_default();
                return Ok((data_end, crc, i));
            }
            _ => i += 1,
        }
    }
    Err(CrxError::Format(format!(
        "no entry boundary after deferred-size entry at {data_start}"
    )))
}

fn decode(entry: &LocalEntry<'_>, name: &str) -> CrxResult<Vec<u8>> {
    let out = match entry.method {
        METHOD_STORED => entry.data.to_vec(),
        METHOD_DEFLATE => {
            let mut out = Vec::with_capacity(entry.data.len() * 3);
            DeflateDecoder::new(entry.data)
                .read_to_end(&mut out)
                .map_err(|e| CrxError::Decompress {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            out
        }
        other => {
            return Err(CrxError::Decompress {
                name: name.to_string(),
                reason: format!("unsupported compression method {other}"),
            })
        }
    };

    let mut crc = Crc::new();
    crc.update(&out);
    if crc.sum() != entry.crc32 {
        return Err(CrxError::Decompress {
            name: name.to_string(),
            reason: format!("crc32 {:08x} != {:08x}", crc.sum(), entry.crc32),
        });
    }
    Ok(out)
}

/// Reads a single entry by walking local file headers from the start of the
/// ZIP. Entries before it are skipped without being inflated.
pub fn read_entry(zip: &[u8], name: &str) -> CrxResult<Vec<u8>> {
    let mut pos = 0usize;
    loop {
        match u32_at(zip, pos) {
            Some(LOCAL_HEADER_SIG) => {}
            None | Some(CENTRAL_HEADER_SIG | END_OF_CENTRAL_SIG) => {
                return Err(CrxError::EntryNotFound(name.to_string()))
            }
            Some(_) => {
                return Err(CrxError::Format(format!(
                    "expected local file header signature at {pos}"
                )))
            }
        }

        let entry = read_local_entry(zip, pos)?;
        if entry.name == name.as_bytes() {
            debug!(name, offset = pos, size = entry.data.len(), "reading zip entry");
            return decode(&entry, name);
        }
        pos = entry.next;
    }
}

/// Extracts every entry of the ZIP into `dest`.
pub fn extract_all(zip: &[u8], dest: &Path) -> CrxResult<()> {
    let mut archive = ZipArchive::new(Cursor::new(zip))?;
    archive.extract(dest)?;
    Ok(())
}
