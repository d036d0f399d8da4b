#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::crx::format::CRX_ID_LEN;
use crate::crx::spki::spki_encode;

/// Extension ids spell each nibble of the truncated key hash with `a`..=`p`.
const ID_ALPHABET: &[u8; 16] = b"abcdefghijklmnop";

/// 32-character extension id derived from DER-encoded public key bytes.
pub fn extension_id(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    let mut out = String::with_capacity(CRX_ID_LEN * 2);
    for b in &digest[..CRX_ID_LEN] {
        out.push(ID_ALPHABET[(b >> 4) as usize] as char);
        out.push(ID_ALPHABET[(b & 0x0f) as usize] as char);
    }
    out
}

/// Standard base64 of the key, as expected by a manifest's `"key"` field.
pub fn public_key_base64(public_key: &[u8]) -> String {
    STANDARD.encode(public_key)
}

/// A SubjectPublicKeyInfo public key and the identifiers derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionKey {
    spki: Vec<u8>,
}

impl ExtensionKey {
    pub fn from_spki(spki: impl Into<Vec<u8>>) -> Self {
        Self { spki: spki.into() }
    }

    /// Wraps a raw RSA modulus/exponent pair (big-endian) into SPKI form.
    pub fn from_rsa_components(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            spki: spki_encode(modulus, exponent),
        }
    }

    pub fn spki(&self) -> &[u8] {
        &self.spki
    }

    pub fn id(&self) -> String {
        extension_id(&self.spki)
    }

    pub fn to_base64(&self) -> String {
        public_key_base64(&self.spki)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_uses_a_to_p_alphabet() {
        let id = extension_id(b"some key bytes");
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|c| (b'a'..=b'p').contains(&c)));
        assert_eq!(id, extension_id(b"some key bytes"));
        assert_ne!(id, extension_id(b"other key bytes"));
    }

    #[test]
    fn id_of_empty_key_is_pinned() {
        // sha256("") = e3b0c442 98fc1c14 9afbf4c8 996fb924 ...
        assert_eq!(extension_id(b""), "odlameecjipmbmbejkplpemijjgpljce");
    }

    #[test]
    fn base64_is_standard_padded() {
        assert_eq!(public_key_base64(&[0xfb, 0xff]), "+/8=");
    }

    #[test]
    fn rsa_components_feed_the_id() {
        let key = ExtensionKey::from_rsa_components(&[0x00, 0xc3, 0x11], &[0x01, 0x00, 0x01]);
        assert_eq!(key.spki()[0], 0x30);
        assert_eq!(key.id(), extension_id(key.spki()));
        assert_eq!(ExtensionKey::from_spki(key.spki().to_vec()), key);
    }
}
