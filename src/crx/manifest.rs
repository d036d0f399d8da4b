#![forbid(unsafe_code)]

use serde_json::Value;

use crate::crx::error::{CrxError, CrxResult};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Sets the manifest's `"key"` field (replacing any previous one) and returns
/// the document pretty-printed.
pub fn inject_key(manifest: &[u8], key_b64: &str) -> CrxResult<String> {
    let mut doc: Value = serde_json::from_slice(manifest)?;
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| CrxError::Format("manifest is not a JSON object".into()))?;
    obj.insert("key".to_owned(), Value::String(key_b64.to_owned()));
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_and_replaces_key() {
        let out = inject_key(br#"{"name":"demo","version":"1.0"}"#, "QUJD").unwrap();
        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["key"], "QUJD");
        assert_eq!(doc["name"], "demo");
        assert!(out.contains('\n'));

        let again = inject_key(out.as_bytes(), "REVG").unwrap();
        let doc: Value = serde_json::from_str(&again).unwrap();
        assert_eq!(doc["key"], "REVG");
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(inject_key(b"[1,2]", "x"), Err(CrxError::Format(_))));
        assert!(matches!(inject_key(b"{", "x"), Err(CrxError::Manifest(_))));
    }
}
