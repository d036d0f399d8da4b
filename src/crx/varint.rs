#![forbid(unsafe_code)]

use crate::crx::error::{CrxError, CrxResult};

/// Longest encoding of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Cursor over a protobuf-encoded byte slice.
#[derive(Debug, Clone)]
pub struct VarintReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Base-128 little-endian groups, high bit set on every byte but the last.
    pub fn read_varint(&mut self) -> CrxResult<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(CrxError::MalformedHeader(format!(
                    "varint runs past end at {}",
                    self.pos
                )));
            };
            self.pos += 1;

            let group = u64::from(byte & 0x7f);
            if i == MAX_VARINT_LEN - 1 && group > 1 {
                return Err(CrxError::MalformedHeader("varint overflows u64".into()));
            }
            value |= group << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CrxError::MalformedHeader("varint longer than 10 bytes".into()))
    }

    pub fn read_bytes(&mut self, len: usize) -> CrxResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(CrxError::Truncated {
                what: "length-delimited field",
                needed: len,
                available: self.remaining(),
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> CrxResult<()> {
        self.read_bytes(len).map(|_| ())
    }
}
