#![forbid(unsafe_code)]

use std::path::{Component, Path, PathBuf};

use crate::pak::content::ContentKind;
use crate::pak::error::{PakError, PakResult};

pub const RESOURCES_DIR: &str = "resources";

/// Manifest-relative file name for an exported resource, always with forward slashes.
pub fn resource_file(id: u16, kind: ContentKind) -> String {
    let ext = match kind {
        ContentKind::Text => "txt",
        ContentKind::Binary => "bin",
    };
    format!("{RESOURCES_DIR}/{id}.{ext}")
}

/// Joins a manifest-relative path onto the export dir, refusing anything
/// that would land outside it.
pub fn resolve_in(root: &Path, rel: &str) -> PakResult<PathBuf> {
    let normalized = rel.replace('\\', "/");
    let rel_path = Path::new(&normalized);

    let mut out = root.to_path_buf();
    for comp in rel_path.components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(PakError::Outside(rel.to_string())),
        }
    }

    if out == root {
        return Err(PakError::Manifest(format!("empty resource path `{rel}`")));
    }
    Ok(out)
}

pub fn has_pak_ext(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pak"))
}

/// `resources.pak` -> `resources.pak.bak`
pub fn backup_path(p: &Path) -> PathBuf {
    let mut s = p.as_os_str().to_owned();
    s.push(".bak");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_inside_root() {
        let root = Path::new("/tmp/export");
        assert_eq!(
            resolve_in(root, "resources/12.txt").unwrap(),
            root.join("resources").join("12.txt")
        );
        assert_eq!(
            resolve_in(root, "resources\\12.bin").unwrap(),
            root.join("resources").join("12.bin")
        );
    }

    #[test]
    fn refuses_escapes() {
        let root = Path::new("/tmp/export");
        assert!(matches!(resolve_in(root, "../x"), Err(PakError::Outside(_))));
        assert!(matches!(resolve_in(root, "/etc/passwd"), Err(PakError::Outside(_))));
        assert!(resolve_in(root, ".").is_err());
    }

    #[test]
    fn file_names_follow_kind() {
        assert_eq!(resource_file(7, ContentKind::Text), "resources/7.txt");
        assert_eq!(resource_file(7, ContentKind::Binary), "resources/7.bin");
        assert!(has_pak_ext(Path::new("locales/en-US.PAK")));
        assert_eq!(backup_path(Path::new("a/resources.pak")), Path::new("a/resources.pak.bak"));
    }
}
