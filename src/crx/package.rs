#![forbid(unsafe_code)]

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::crx::error::{CrxError, CrxResult};
use crate::crx::format::{
    CRX_ID_LEN, FIELD_CRX_ID, FIELD_PUBLIC_KEY, FIELD_SHA256_WITH_ECDSA, FIELD_SHA256_WITH_RSA,
    FIELD_SIGNED_HEADER_DATA, MAGIC, V2_PREFIX_LEN, V3_PREFIX_LEN,
};
use crate::crx::key::{extension_id, public_key_base64};
use crate::crx::manifest::MANIFEST_FILE;
use crate::crx::proto::{walk, FieldValue};
use crate::crx::payload::{extract_all, read_entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrxVersion {
    V2 { pubkey_len: u32, sig_len: u32 },
    V3 { header_len: u32 },
}

/// Where the selected public key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The single key of a v2 header.
    Header,
    /// A v3 candidate whose truncated SHA-256 equals the declared crx id.
    Verified,
    /// First v3 candidate, used because no candidate matched (or no id was declared).
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedKey<'a> {
    pub bytes: &'a [u8],
    pub source: KeySource,
}

/// A parsed CRX header borrowing the package bytes. The embedded ZIP is only
/// located, never copied.
#[derive(Debug, Clone)]
pub struct CrxPackage<'a> {
    data: &'a [u8],
    version: CrxVersion,
    public_keys: Vec<&'a [u8]>,
    crx_id: Option<[u8; CRX_ID_LEN]>,
    zip_offset: usize,
}

fn read_u32_at(data: &[u8], at: usize, what: &'static str) -> CrxResult<u32> {
    let bytes = data.get(at..at + 4).ok_or(CrxError::Truncated {
        what,
        needed: at + 4,
        available: data.len(),
    })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl<'a> CrxPackage<'a> {
    pub fn parse(data: &'a [u8]) -> CrxResult<Self> {
        if data.len() < 4 {
            return Err(CrxError::Truncated {
                what: "magic",
                needed: 4,
                available: data.len(),
            });
        }
        if data[..4] != MAGIC {
            return Err(CrxError::Format("bad magic".into()));
        }

        match read_u32_at(data, 4, "version")? {
            2 => Self::parse_v2(data),
            3 => Self::parse_v3(data),
            other => Err(CrxError::Format(format!("unsupported version {other}"))),
        }
    }

    fn parse_v2(data: &'a [u8]) -> CrxResult<Self> {
        let pubkey_len = read_u32_at(data, 8, "public key length")?;
        let sig_len = read_u32_at(data, 12, "signature length")?;

        let key_end = V2_PREFIX_LEN + pubkey_len as usize;
        let zip_offset = key_end + sig_len as usize;
        if zip_offset > data.len() {
            return Err(CrxError::Truncated {
                what: "v2 key and signature",
                needed: zip_offset,
                available: data.len(),
            });
        }

        Ok(Self {
            data,
            version: CrxVersion::V2 {
                pubkey_len,
                sig_len,
            },
            public_keys: vec![&data[V2_PREFIX_LEN..key_end]],
            crx_id: None,
            zip_offset,
        })
    }

    fn parse_v3(data: &'a [u8]) -> CrxResult<Self> {
        let header_len = read_u32_at(data, 8, "header length")?;
        let zip_offset = V3_PREFIX_LEN + header_len as usize;
        if zip_offset > data.len() {
            return Err(CrxError::Truncated {
                what: "v3 header",
                needed: zip_offset,
                available: data.len(),
            });
        }

        let header = &data[V3_PREFIX_LEN..zip_offset];
        let mut public_keys = Vec::new();
        let mut crx_id = None;

        walk(header, |field, value| {
            match (field, value) {
                (FIELD_SHA256_WITH_RSA | FIELD_SHA256_WITH_ECDSA, FieldValue::Bytes(proof)) => {
                    walk(proof, |f, v| {
                        if let (FIELD_PUBLIC_KEY, FieldValue::Bytes(key)) = (f, v) {
                            public_keys.push(key);
                        }
                        Ok(())
                    })?;
                }
                (FIELD_SIGNED_HEADER_DATA, FieldValue::Bytes(signed)) => {
                    walk(signed, |f, v| {
                        if let (FIELD_CRX_ID, FieldValue::Bytes(id)) = (f, v) {
                            let id: [u8; CRX_ID_LEN] = id.try_into().map_err(|_| {
                                CrxError::MalformedHeader(format!(
                                    "crx_id is {} bytes, expected {CRX_ID_LEN}",
                                    id.len()
                                ))
                            })?;
                            crx_id = Some(id);
                        }
                        Ok(())
                    })?;
                }
                // Unknown fields of any supported wire type are skipped.
                _ => {}
            }
            Ok(())
        })?;

        Ok(Self {
            data,
            version: CrxVersion::V3 { header_len },
            public_keys,
            crx_id,
            zip_offset,
        })
    }

    pub fn version(&self) -> CrxVersion {
        self.version
    }

    pub fn format_version(&self) -> u32 {
        match self.version {
            CrxVersion::V2 { .. } => 2,
            CrxVersion::V3 { .. } => 3,
        }
    }

    /// Candidate public keys in header order.
    pub fn public_keys(&self) -> &[&'a [u8]] {
        &self.public_keys
    }

    /// The declared 16-byte id (v3 only).
    pub fn crx_id(&self) -> Option<&[u8; CRX_ID_LEN]> {
        self.crx_id.as_ref()
    }

    pub fn zip_offset(&self) -> usize {
        self.zip_offset
    }

    pub fn zip_length(&self) -> usize {
        self.data.len() - self.zip_offset
    }

    pub fn zip_bytes(&self) -> &'a [u8] {
        &self.data[self.zip_offset..]
    }

    /// Picks the key whose truncated SHA-256 equals the declared id. When no
    /// candidate matches, the first one is returned as [`KeySource::Fallback`]
    /// and the deviation is logged.
    pub fn select_public_key(&self) -> CrxResult<SelectedKey<'a>> {
        let first = *self.public_keys.first().ok_or(CrxError::NoPublicKey)?;

        if let CrxVersion::V2 { .. } = self.version {
            return Ok(SelectedKey {
                bytes: first,
                source: KeySource::Header,
            });
        }

        if let Some(id) = &self.crx_id {
            if let Some(&key) = self
                .public_keys
                .iter()
                .find(|key| Sha256::digest(key)[..CRX_ID_LEN] == id[..])
            {
                return Ok(SelectedKey {
                    bytes: key,
                    source: KeySource::Verified,
                });
            }
        }

        warn!(
            candidates = self.public_keys.len(),
            declared_id = self.crx_id.is_some(),
            "no crx3 key matches the declared id, using the first candidate"
        );
        Ok(SelectedKey {
            bytes: first,
            source: KeySource::Fallback,
        })
    }

    pub fn public_key_base64(&self) -> CrxResult<String> {
        Ok(public_key_base64(self.select_public_key()?.bytes))
    }

    pub fn extension_id(&self) -> CrxResult<String> {
        Ok(extension_id(self.select_public_key()?.bytes))
    }

    /// Reads one entry of the embedded ZIP without inflating the others.
    pub fn read_entry(&self, name: &str) -> CrxResult<Vec<u8>> {
        read_entry(self.zip_bytes(), name)
    }

    pub fn manifest(&self) -> CrxResult<serde_json::Value> {
        let bytes = self.read_entry(MANIFEST_FILE)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn extract(&self, dest: &Path) -> CrxResult<()> {
        extract_all(self.zip_bytes(), dest)
    }
}
