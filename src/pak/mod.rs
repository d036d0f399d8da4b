#![forbid(unsafe_code)]

//! Chromium data pack (`.pak`) codec: parse, query, rewrite, export/import
//! and content patching.

mod archive;
mod build;
mod content;
mod error;
mod export;
mod format;
mod io;
mod ops;
mod patch;
mod path;
mod read;

pub use archive::PakArchive;
pub use content::{classify, deflate, inflate, ContentKind, Decoded};
pub use error::{PakError, PakResult};
pub use export::{export, import, read_manifest, ExportManifest, ManifestEntry, MANIFEST_FILE};
pub use format::{is_gzipped, Alias, PakVersion, ResourceInfo, GZIP_MAGIC};
pub use patch::{PatchOutcome, PatchRule, PatchSet, PatchedResource};
pub use path::backup_path;

pub use ops::{
    export_file, find_paks, import_file, list, open, patch_file, verify, write_verified,
    FilePatch, VerifyReport, WriteOutcome,
};
