#![forbid(unsafe_code)]

use std::io::{Read, Write};

use crate::pak::error::{PakError, PakResult};

pub fn write_u8(w: &mut dyn Write, v: u8) -> PakResult<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn write_u16(w: &mut dyn Write, v: u16) -> PakResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_u32(w: &mut dyn Write, v: u32) -> PakResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_exact<const N: usize>(r: &mut dyn Read) -> PakResult<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8(r: &mut dyn Read) -> PakResult<u8> {
    Ok(read_exact::<1>(r)?[0])
}

pub fn read_u16(r: &mut dyn Read) -> PakResult<u16> {
    Ok(u16::from_le_bytes(read_exact::<2>(r)?))
}

pub fn read_u32(r: &mut dyn Read) -> PakResult<u32> {
    Ok(u32::from_le_bytes(read_exact::<4>(r)?))
}

/// Fails with [`PakError::Truncated`] unless `available >= needed`.
pub fn ensure_len(what: &'static str, needed: usize, available: usize) -> PakResult<()> {
    if available < needed {
        return Err(PakError::Truncated {
            what,
            needed,
            available,
        });
    }
    Ok(())
}

pub fn to_u32_offset(v: usize) -> PakResult<u32> {
    u32::try_from(v).map_err(|_| PakError::Format(format!("offset {v} exceeds u32 range")))
}
