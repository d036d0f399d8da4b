#![forbid(unsafe_code)]

use std::fs;
use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use patchkit::crx::{
    self, extension_id, CrxError, CrxPackage, ExtensionKey, KeySource, VarintReader,
};

const MANIFEST: &str = r#"{"manifest_version":3,"name":"Demo","version":"1.2.3"}"#;

fn varint(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let b = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(b);
            return;
        }
        out.push(b | 0x80);
    }
}

fn bytes_field(field: u64, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    varint((field << 3) | 2, &mut out);
    varint(body.len() as u64, &mut out);
    out.extend_from_slice(body);
    out
}

fn sample_zip() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file(
        "manifest.json",
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )
    .unwrap();
    zip.write_all(MANIFEST.as_bytes()).unwrap();
    zip.start_file(
        "js/background.js",
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    )
    .unwrap();
    zip.write_all(b"console.log('hi');").unwrap();
    zip.finish().unwrap().into_inner()
}

fn key_proof(key: &[u8]) -> Vec<u8> {
    let mut proof = bytes_field(1, key);
    proof.extend(bytes_field(2, &[0xab; 64]));
    proof
}

fn crx3(keys: &[&[u8]], declared: Option<&[u8]>, zip: &[u8]) -> Vec<u8> {
    let mut header = Vec::new();
    for key in keys {
        header.extend(bytes_field(2, &key_proof(key)));
    }
    // An unrelated varint field the reader must skip.
    header.extend_from_slice(&[0x20, 0x07]);
    if let Some(id) = declared {
        header.extend(bytes_field(10000, &bytes_field(1, id)));
    }

    let mut out = b"Cr24".to_vec();
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend(header);
    out.extend_from_slice(zip);
    out
}

fn crx2(key: &[u8], sig: &[u8], zip: &[u8]) -> Vec<u8> {
    let mut out = b"Cr24".to_vec();
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(&(sig.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(sig);
    out.extend_from_slice(zip);
    out
}

#[test]
fn crx3_selects_the_key_matching_the_declared_id() {
    let k1 = ExtensionKey::from_rsa_components(&[0xc1; 128], &[1, 0, 1]);
    let k2 = ExtensionKey::from_rsa_components(&[0xd2; 128], &[1, 0, 1]);
    let digest = Sha256::digest(k2.spki());
    let zip = sample_zip();
    let data = crx3(&[k1.spki(), k2.spki()], Some(&digest[..16]), &zip);

    let pkg = CrxPackage::parse(&data).unwrap();
    assert_eq!(pkg.format_version(), 3);
    assert_eq!(pkg.public_keys().len(), 2);
    assert_eq!(pkg.zip_length(), zip.len());
    assert_eq!(pkg.zip_bytes(), &zip[..]);

    let selected = pkg.select_public_key().unwrap();
    assert_eq!(selected.source, KeySource::Verified);
    assert_eq!(selected.bytes, k2.spki());
    assert_ne!(selected.bytes, k1.spki());
    assert_eq!(pkg.extension_id().unwrap(), k2.id());
    assert_eq!(pkg.public_key_base64().unwrap(), k2.to_base64());
    assert_eq!(crx::crx_extension_id(&data).unwrap(), k2.id());
    assert_eq!(crx::crx_public_key_base64(&data).unwrap(), k2.to_base64());
}

#[test]
fn crx3_without_matching_id_falls_back_to_first_key() {
    let zip = sample_zip();
    for declared in [None, Some(&[0u8; 16][..])] {
        let data = crx3(&[b"first", b"second"], declared, &zip);
        let key = CrxPackage::parse(&data).unwrap().select_public_key().unwrap();
        assert_eq!(key.source, KeySource::Fallback);
        assert_eq!(key.bytes, b"first");
    }
}

#[test]
fn crx2_payload_offset() {
    let zip = sample_zip();
    let data = crx2(b"public-key", b"sig", &zip);
    let pkg = CrxPackage::parse(&data).unwrap();
    assert_eq!(pkg.zip_offset(), 16 + 10 + 3);
    assert_eq!(pkg.select_public_key().unwrap().source, KeySource::Header);
    assert_eq!(pkg.extension_id().unwrap(), extension_id(b"public-key"));
    assert_eq!(pkg.public_key_base64().unwrap(), STANDARD.encode(b"public-key"));
}

#[test]
fn reads_single_entries_without_extracting() {
    let zip = sample_zip();
    let data = crx3(&[b"k"], None, &zip);
    let pkg = CrxPackage::parse(&data).unwrap();

    assert_eq!(pkg.read_entry("manifest.json").unwrap(), MANIFEST.as_bytes());
    assert_eq!(pkg.read_entry("js/background.js").unwrap(), b"console.log('hi');");
    assert!(matches!(pkg.read_entry("missing.js"), Err(CrxError::EntryNotFound(_))));
    assert_eq!(pkg.manifest().unwrap()["name"], "Demo");
}

#[test]
fn extract_unpacks_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let data = crx3(&[b"k"], None, &sample_zip());
    CrxPackage::parse(&data).unwrap().extract(dir.path()).unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("manifest.json")).unwrap(), MANIFEST);
    assert_eq!(
        fs::read(dir.path().join("js/background.js")).unwrap(),
        b"console.log('hi');"
    );
}

#[test]
fn injected_key_pins_the_unpacked_id() {
    let key = ExtensionKey::from_rsa_components(&[0x9f; 256], &[1, 0, 1]);
    let updated = crx::inject_key(MANIFEST.as_bytes(), &key.to_base64()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&updated).unwrap();

    let spki = STANDARD.decode(doc["key"].as_str().unwrap()).unwrap();
    assert_eq!(extension_id(&spki), key.id());
    assert_eq!(doc["version"], "1.2.3");
}

#[test]
fn malformed_headers_are_rejected() {
    let mut data = crx3(&[b"k"], None, b"");
    // Replace the skipped varint field with a group start tag.
    let at = data.len() - 2;
    data[at] = 0x23;
    assert!(matches!(CrxPackage::parse(&data), Err(CrxError::MalformedHeader(_))));

    assert!(matches!(
        CrxPackage::parse(b"PK\x03\x04rest"),
        Err(CrxError::Format(_))
    ));
}

#[test]
fn varint_reader_decodes_multibyte_values() {
    let mut buf = Vec::new();
    varint(300, &mut buf);
    varint(u64::MAX, &mut buf);
    let mut r = VarintReader::new(&buf);
    assert_eq!(r.read_varint().unwrap(), 300);
    assert_eq!(r.read_varint().unwrap(), u64::MAX);
    assert!(r.is_empty());
}
