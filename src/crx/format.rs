#![forbid(unsafe_code)]

/// CRX header magic.
pub const MAGIC: [u8; 4] = *b"Cr24";

/// magic + version + pubkey_len + sig_len
pub(crate) const V2_PREFIX_LEN: usize = 16;

/// magic + version + header_len
pub(crate) const V3_PREFIX_LEN: usize = 12;

/// `CrxFileHeader.sha256_with_rsa` (repeated AsymmetricKeyProof)
pub(crate) const FIELD_SHA256_WITH_RSA: u64 = 2;
/// `CrxFileHeader.sha256_with_ecdsa` (repeated AsymmetricKeyProof)
pub(crate) const FIELD_SHA256_WITH_ECDSA: u64 = 3;
/// `CrxFileHeader.signed_header_data` (serialized SignedData)
pub(crate) const FIELD_SIGNED_HEADER_DATA: u64 = 10000;
/// `AsymmetricKeyProof.public_key`
pub(crate) const FIELD_PUBLIC_KEY: u64 = 1;
/// `SignedData.crx_id`
pub(crate) const FIELD_CRX_ID: u64 = 1;

/// Length of the content-derived id (truncated SHA-256 of the public key).
pub const CRX_ID_LEN: usize = 16;
