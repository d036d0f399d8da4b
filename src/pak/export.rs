#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pak::archive::PakArchive;
use crate::pak::content::{classify, deflate, inflate, ContentKind};
use crate::pak::error::{PakError, PakResult};
use crate::pak::format::{is_gzipped, Alias, PakVersion};
use crate::pak::path::{resolve_in, resource_file};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Sidecar description of an exported pak. Together with the exported files
/// it is enough to rebuild the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: u32,
    pub encoding: u8,
    pub resources: BTreeMap<u16, ManifestEntry>,
    /// alias id -> index into the resource table
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<u16, u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub file: String,
    /// Size of the resource as stored in the pak.
    pub original_size: usize,
    /// The stored resource starts with the gzip magic.
    pub gzipped: bool,
    /// The exported file holds the inflated content and must be re-gzipped.
    pub decompressed: bool,
    /// Size of the exported file.
    pub content_size: usize,
}

/// Writes every resource to `dir/resources/` and the manifest to
/// `dir/manifest.json`.
pub fn export(archive: &PakArchive, dir: &Path) -> PakResult<ExportManifest> {
    let mut resources = BTreeMap::new();

    for id in archive.ids() {
        let stored = archive.get(id).ok_or(PakError::UnknownResource(id))?;
        let gzipped = is_gzipped(stored);

        let (content, decompressed) = if gzipped {
            match inflate(id, stored) {
                Ok(inflated) => (inflated, true),
                Err(e) => {
                    warn!(id, error = %e, "exporting gzip resource without inflating it");
                    (stored.to_vec(), false)
                }
            }
        } else {
            (stored.to_vec(), false)
        };

        let kind = classify(&content);
        let file = resource_file(id, kind);
        let path = resolve_in(dir, &file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &content)?;

        resources.insert(
            id,
            ManifestEntry {
                kind,
                file,
                original_size: stored.len(),
                gzipped,
                decompressed,
                content_size: content.len(),
            },
        );
    }

    let manifest = ExportManifest {
        version: archive.version().as_u32(),
        encoding: archive.encoding(),
        resources,
        aliases: archive
            .aliases()
            .iter()
            .map(|a| (a.id, a.target_index))
            .collect(),
    };

    let json = serde_json::to_vec_pretty(&manifest)?;
    fs::write(dir.join(MANIFEST_FILE), json)?;
    debug!(dir = %dir.display(), resources = manifest.resources.len(), "exported pak");
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> PakResult<ExportManifest> {
    let bytes = fs::read(dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Rebuilds an archive from an export directory. Resources are written in
/// ascending id order; decompressed resources are gzipped again.
pub fn import(dir: &Path) -> PakResult<PakArchive> {
    let manifest = read_manifest(dir)?;
    let version = PakVersion::from_u32(manifest.version)?;

    let mut resources = Vec::with_capacity(manifest.resources.len());
    for (&id, entry) in &manifest.resources {
        let path = resolve_in(dir, &entry.file)?;
        let content = fs::read(&path)?;
        if content.len() != entry.content_size {
            debug!(id, before = entry.content_size, after = content.len(), "resource was edited");
        }

        let bytes = if entry.decompressed {
            deflate(&content)?
        } else {
            content
        };
        resources.push((id, bytes));
    }

    let aliases: Vec<Alias> = manifest
        .aliases
        .iter()
        .map(|(&id, &target_index)| Alias { id, target_index })
        .collect();

    PakArchive::from_resources(version, manifest.encoding, &resources, &aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_uses_camel_case_fields() {
        let mut resources = BTreeMap::new();
        resources.insert(
            5,
            ManifestEntry {
                kind: ContentKind::Text,
                file: "resources/5.txt".into(),
                original_size: 10,
                gzipped: true,
                decompressed: true,
                content_size: 20,
            },
        );
        let m = ExportManifest {
            version: 5,
            encoding: 1,
            resources,
            aliases: BTreeMap::new(),
        };
        let v = serde_json::to_value(&m).unwrap();
        let entry = &v["resources"]["5"];
        assert_eq!(entry["type"], "text");
        assert_eq!(entry["originalSize"], 10);
        assert_eq!(entry["contentSize"], 20);
        assert!(v.get("aliases").is_none());

        let back: ExportManifest = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }
}
