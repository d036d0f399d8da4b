#![forbid(unsafe_code)]

//! Minimal DER writer for an RSA SubjectPublicKeyInfo.

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

/// rsaEncryption, 1.2.840.113549.1.1.1
const OID_RSA_ENCRYPTION: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

fn push_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    push_len(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// Unsigned big-endian magnitude as a DER INTEGER.
fn unsigned_integer(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude.iter().take_while(|b| **b == 0).count();
    let trimmed = &magnitude[skip..];

    let mut content = Vec::with_capacity(trimmed.len() + 1);
    match trimmed.first() {
        None => content.push(0),
        Some(&b) if b & 0x80 != 0 => {
            content.push(0);
            content.extend_from_slice(trimmed);
        }
        Some(_) => content.extend_from_slice(trimmed),
    }
    tlv(TAG_INTEGER, &content)
}

/// SEQUENCE { SEQUENCE { rsaEncryption, NULL }, BIT STRING { RSAPublicKey } }
pub fn spki_encode(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let mut rsa_key = unsigned_integer(modulus);
    rsa_key.extend(unsigned_integer(exponent));
    let rsa_key = tlv(TAG_SEQUENCE, &rsa_key);

    let mut bits = Vec::with_capacity(rsa_key.len() + 1);
    bits.push(0); // unused bits
    bits.extend(rsa_key);

    let mut algorithm = tlv(TAG_OID, &OID_RSA_ENCRYPTION);
    algorithm.extend(tlv(TAG_NULL, &[]));
    let algorithm = tlv(TAG_SEQUENCE, &algorithm);

    let mut body = algorithm;
    body.extend(tlv(TAG_BIT_STRING, &bits));
    tlv(TAG_SEQUENCE, &body)
}
