//! Package archives: zip decoding and installation into a repository.

mod installer;
mod zip;

use std::time::SystemTime;

use thiserror::Error;

pub use installer::{ArchiveInstaller, ArchiveSource};
pub use zip::read_entries;

#[derive(Debug, Error, PartialEq)]
pub enum InstallError {
    #[error("No haxelib.json found in the archive")]
    ManifestNotFound,
    #[error("Archive entry '{0}' would be extracted outside the package directory")]
    UnsafePath(String),
}

/// One decoded archive entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
    pub modified: Option<SystemTime>,
}
