#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn temp_sibling(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// A fully written and synced temp file next to its target, waiting for the
/// rename. Dropping it without [`StagedWrite::commit`] removes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    target: PathBuf,
    done: bool,
}

impl StagedWrite {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        self.done = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.done {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Writes `bytes` to the temp sibling of `path` without touching `path`.
pub fn stage(path: &Path, bytes: &[u8]) -> io::Result<StagedWrite> {
    let tmp = temp_sibling(path);
    let mut f = File::create(&tmp)?;
    let staged = StagedWrite {
        tmp,
        target: path.to_path_buf(),
        done: false,
    };
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(staged)
}

/// Replaces `path` with `bytes` via a sibling temp file and a rename, so
/// readers see either the old or the new content, never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    stage(path, bytes)?.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("prefs.json");
        fs::write(&p, b"old").unwrap();
        write_atomic(&p, b"new").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"new");
        assert!(!temp_sibling(&p).exists());
    }

    #[test]
    fn missing_parent_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nope").join("x.json");
        assert!(write_atomic(&p, b"x").is_err());
    }

    #[test]
    fn dropped_stage_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("registry.json");
        fs::write(&p, b"old").unwrap();

        let staged = stage(&p, b"new").unwrap();
        assert!(temp_sibling(&p).exists());
        drop(staged);

        assert_eq!(fs::read(&p).unwrap(), b"old");
        assert!(!temp_sibling(&p).exists());
    }
}
