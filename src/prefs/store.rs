#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::fsutil::write_atomic;
use crate::prefs::error::{PrefsError, PrefsResult};
use crate::prefs::integrity::MacSet;
use crate::prefs::tree::{build_tree, MacTree};

/// Where one trust domain persists its codes.
pub trait MacStore {
    fn macs(&self) -> &MacTree;

    fn super_mac(&self) -> Option<&str>;

    /// Replaces every stored code with `set`.
    fn store(&mut self, set: MacSet);

    fn path(&self) -> &Path;

    /// The bytes `save` writes.
    fn encode(&self) -> PrefsResult<Vec<u8>>;

    fn save(&self) -> PrefsResult<()> {
        write_atomic(self.path(), &self.encode()?)?;
        debug!(path = %self.path().display(), "saved codes");
        Ok(())
    }

    fn tracked_paths(&self) -> Vec<String> {
        self.macs().flatten().into_keys().collect()
    }
}

/// The preferences file itself: live values plus `protection.macs` and
/// `protection.super_mac`.
#[derive(Debug, Clone)]
pub struct FileMacStore {
    path: PathBuf,
    document: Value,
    macs: MacTree,
    super_mac: Option<String>,
}

impl FileMacStore {
    pub fn load(path: &Path) -> PrefsResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_document(path, serde_json::from_slice(&bytes)?)
    }

    pub fn from_document(path: &Path, document: Value) -> PrefsResult<Self> {
        if !document.is_object() {
            return Err(PrefsError::InvalidStore(format!(
                "{} is not a JSON object",
                path.display()
            )));
        }
        let protection = document.get("protection");
        let macs = match protection.and_then(|p| p.get("macs")) {
            Some(tree) => MacTree::from_json(tree)?,
            None => MacTree::new(),
        };
        let super_mac = protection
            .and_then(|p| p.get("super_mac"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self {
            path: path.to_path_buf(),
            document,
            macs,
            super_mac,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn set_document(&mut self, document: Value) {
        self.document = document;
    }

    /// The document with the current codes written into `protection`.
    pub fn to_json(&self) -> Value {
        let mut doc = self.document.clone();
        if let Value::Object(root) = &mut doc {
            let protection = root
                .entry("protection")
                .or_insert_with(|| Value::Object(Map::new()));
            if !protection.is_object() {
                *protection = Value::Object(Map::new());
            }
            if let Value::Object(p) = protection {
                p.insert("macs".into(), self.macs.to_json());
                match &self.super_mac {
                    Some(code) => p.insert("super_mac".into(), Value::String(code.clone())),
                    None => p.remove("super_mac"),
                };
            }
        }
        doc
    }
}

impl MacStore for FileMacStore {
    fn macs(&self) -> &MacTree {
        &self.macs
    }

    fn super_mac(&self) -> Option<&str> {
        self.super_mac.as_deref()
    }

    fn store(&mut self, set: MacSet) {
        self.macs = set.macs;
        self.super_mac = Some(set.super_mac);
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self) -> PrefsResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    macs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    super_mac: Option<String>,
}

/// Registry-style store: one value per full dotted path plus the super code,
/// kept in a JSON file.
#[derive(Debug, Clone)]
pub struct RegistryMacStore {
    path: PathBuf,
    macs: MacTree,
    super_mac: Option<String>,
}

impl RegistryMacStore {
    /// A missing file is an empty store.
    pub fn load(path: &Path) -> PrefsResult<Self> {
        let file: RegistryFile = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            macs: build_tree(&file.macs)?,
            super_mac: file.super_mac,
        })
    }
}

impl MacStore for RegistryMacStore {
    fn macs(&self) -> &MacTree {
        &self.macs
    }

    fn super_mac(&self) -> Option<&str> {
        self.super_mac.as_deref()
    }

    fn store(&mut self, set: MacSet) {
        self.macs = set.macs;
        self.super_mac = Some(set.super_mac);
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self) -> PrefsResult<Vec<u8>> {
        let file = RegistryFile {
            macs: self.macs.flatten(),
            super_mac: self.super_mac.clone(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }
}
