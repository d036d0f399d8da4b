#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::fsutil::write_atomic;
use crate::pak::archive::PakArchive;
use crate::pak::content::inflate;
use crate::pak::error::{PakError, PakResult};
use crate::pak::export::{export, import, ExportManifest};
use crate::pak::format::ResourceInfo;
use crate::pak::patch::{PatchOutcome, PatchSet};
use crate::pak::path::{backup_path, has_pak_ext};

pub fn open(pak: &Path) -> PakResult<PakArchive> {
    PakArchive::parse(fs::read(pak)?)
}

/// Read resource table entries (without extracting payloads).
pub fn list(pak: &Path) -> PakResult<Vec<ResourceInfo>> {
    Ok(open(pak)?.resources())
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub resources: usize,
    pub gzipped: usize,
    /// Gzip-framed resources that do not inflate.
    pub broken: Vec<(u16, String)>,
}

/// Parses the pak and inflates every gzip resource.
pub fn verify(pak: &Path) -> PakResult<VerifyReport> {
    let archive = open(pak)?;
    let mut report = VerifyReport {
        resources: archive.len(),
        ..VerifyReport::default()
    };

    for info in archive.resources() {
        if !info.gzipped {
            continue;
        }
        report.gzipped += 1;
        let bytes = archive.get(info.id).ok_or(PakError::UnknownResource(info.id))?;
        if let Err(e) = inflate(info.id, bytes) {
            report.broken.push((info.id, e.to_string()));
        }
    }
    Ok(report)
}

pub fn export_file(pak: &Path, dir: &Path) -> PakResult<ExportManifest> {
    let archive = open(pak)?;
    fs::create_dir_all(dir)?;
    export(&archive, dir)
}

pub fn import_file(dir: &Path, output: &Path) -> PakResult<WriteOutcome> {
    let archive = import(dir)?;
    write_verified(output, archive.as_bytes())
}

/// Every `*.pak` file under `root`, sorted by path.
pub fn find_paks(root: &Path) -> PakResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in WalkDir::new(root).follow_links(false) {
        let ent = ent.map_err(|e| {
            let msg = e.to_string();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, msg));
            PakError::Io(io)
        })?;
        if ent.file_type().is_file() && has_pak_ext(ent.path()) {
            out.push(ent.path().to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Content on disk changed; blake3 digests before and after.
    Written { before: String, after: String },
    /// The write left the file byte-identical.
    Unchanged { digest: String },
}

fn digest_file(path: &Path) -> PakResult<Option<blake3::Hash>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `bytes` to `path` with a one-time backup and a post-write check.
///
/// - The first write to an existing file copies it to `<path>.bak`; later
///   writes keep that original backup.
/// - If the write fails and left the target different from what it was
///   before, the backup is copied back. An intact target is left alone so an
///   earlier successful write is not rolled back to the original.
/// - If the file hashes the same before and after, the result is
///   [`WriteOutcome::Unchanged`] (a warning, not an error).
pub fn write_verified(path: &Path, bytes: &[u8]) -> PakResult<WriteOutcome> {
    let before = digest_file(path)?;

    let backup = backup_path(path);
    if before.is_some() && !backup.exists() {
        fs::copy(path, &backup)?;
        info!(backup = %backup.display(), "created backup");
    }

    if let Err(source) = write_atomic(path, bytes) {
        let intact = matches!(digest_file(path), Ok(now) if now == before);
        let restored = !intact && backup.exists() && fs::copy(&backup, path).is_ok();
        if restored {
            warn!(path = %path.display(), "write failed, restored backup");
        }
        return Err(PakError::WriteFailed {
            path: path.to_path_buf(),
            source,
            restored,
        });
    }

    let after = blake3::hash(&fs::read(path)?);
    match before {
        Some(b) if b == after => {
            warn!(path = %path.display(), "write had no effect");
            Ok(WriteOutcome::Unchanged {
                digest: after.to_hex().to_string(),
            })
        }
        b => Ok(WriteOutcome::Written {
            before: b.map(|h| h.to_hex().to_string()).unwrap_or_default(),
            after: after.to_hex().to_string(),
        }),
    }
}

#[derive(Debug)]
pub struct FilePatch {
    pub path: PathBuf,
    pub outcome: PatchOutcome,
    /// `None` when nothing matched or on a dry run.
    pub write: Option<WriteOutcome>,
}

/// Applies `set` to the pak at `path` and writes it back (unless `dry_run`).
pub fn patch_file(path: &Path, set: &PatchSet, dry_run: bool) -> PakResult<FilePatch> {
    let archive = open(path)?;
    let outcome = set.scan(&archive)?;

    if outcome.is_empty() || dry_run {
        debug!(path = %path.display(), patched = outcome.patched.len(), dry_run, "no write");
        return Ok(FilePatch {
            path: path.to_path_buf(),
            outcome,
            write: None,
        });
    }

    let bytes = archive.write_with_modifications(&outcome.modifications)?;
    let write = write_verified(path, &bytes)?;
    Ok(FilePatch {
        path: path.to_path_buf(),
        outcome,
        write: Some(write),
    })
}
