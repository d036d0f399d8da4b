#![forbid(unsafe_code)]

//! CRX extension packages: the v2/v3 header, public key selection, the
//! extension id and the embedded ZIP payload.

mod error;
mod format;
mod key;
pub mod manifest;
mod package;
mod payload;
mod proto;
mod spki;
mod varint;

pub use error::{CrxError, CrxResult};
pub use format::{CRX_ID_LEN, MAGIC};
pub use key::{extension_id, public_key_base64, ExtensionKey};
pub use manifest::{inject_key, MANIFEST_FILE};
pub use package::{CrxPackage, CrxVersion, KeySource, SelectedKey};
pub use payload::{extract_all, read_entry};
pub use proto::{walk, FieldValue};
pub use spki::spki_encode;
pub use varint::VarintReader;

/// Base64 of the selected public key of a whole `.crx` file.
pub fn crx_public_key_base64(crx: &[u8]) -> CrxResult<String> {
    CrxPackage::parse(crx)?.public_key_base64()
}

/// Extension id of a whole `.crx` file.
pub fn crx_extension_id(crx: &[u8]) -> CrxResult<String> {
    CrxPackage::parse(crx)?.extension_id()
}
