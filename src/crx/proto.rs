#![forbid(unsafe_code)]

use crate::crx::error::{CrxError, CrxResult};
use crate::crx::varint::VarintReader;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64,
    Fixed32,
    Bytes(&'a [u8]),
}

/// Walks the top-level fields of a protobuf message, handing each
/// `(field_number, value)` to `visit`. Groups and reserved wire types are
/// malformed.
pub fn walk<'a, F>(msg: &'a [u8], mut visit: F) -> CrxResult<()>
where
    F: FnMut(u64, FieldValue<'a>) -> CrxResult<()>,
{
    let mut r = VarintReader::new(msg);
    while !r.is_empty() {
        let at = r.position();
        let tag = r.read_varint()?;
        let field = tag >> 3;
        let value = match tag & 7 {
            WIRE_VARINT => FieldValue::Varint(r.read_varint()?),
            WIRE_FIXED64 => {
                r.skip(8)?;
                FieldValue::Fixed64
            }
            WIRE_LEN => {
                let len = usize::try_from(r.read_varint()?).map_err(|_| {
                    CrxError::MalformedHeader(format!("field {field} length overflows"))
                })?;
                FieldValue::Bytes(r.read_bytes(len)?)
            }
            WIRE_FIXED32 => {
                r.skip(4)?;
                FieldValue::Fixed32
            }
            wire => {
                return Err(CrxError::MalformedHeader(format!(
                    "field {field} at {at} has unsupported wire type {wire}"
                )))
            }
        };
        if field == 0 {
            return Err(CrxError::MalformedHeader(format!("field number 0 at {at}")));
        }
        visit(field, value)?;
    }
    Ok(())
}
