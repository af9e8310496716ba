use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::package::PackageStore;
use crate::runtime::Runtime;
use crate::runtime::path::{is_path_under, is_safe_relative};

use super::{ArchiveEntry, InstallError, read_entries};

/// Where the archive comes from.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveSource<'b> {
    /// A file on disk, which may be deleted after installation.
    File(&'b Path),
    /// Archive bytes already in memory.
    Bytes(&'b [u8]),
}

/// Installs package archives into a [`PackageStore`].
pub struct ArchiveInstaller<'s, 'a, R: Runtime> {
    store: &'s PackageStore<'a, R>,
}

impl<'s, 'a, R: Runtime> ArchiveInstaller<'s, 'a, R> {
    pub fn new(store: &'s PackageStore<'a, R>) -> Self {
        Self { store }
    }

    /// Install an archive and return its manifest.
    ///
    /// An already extracted version directory is left untouched; only
    /// `set_current` is applied to it. A fresh install becomes current when
    /// asked to, or when the library has no current version yet. A file
    /// source is deleted afterwards when `delete_source` is set.
    #[tracing::instrument(skip(self, source))]
    pub fn install(
        &self,
        source: ArchiveSource<'_>,
        set_current: bool,
        delete_source: bool,
    ) -> Result<Manifest> {
        let runtime = self.store.runtime();
        let owned;
        let bytes = match source {
            ArchiveSource::File(path) => {
                owned = runtime
                    .read(path)
                    .with_context(|| format!("Failed to read archive {:?}", path))?;
                owned.as_slice()
            }
            ArchiveSource::Bytes(bytes) => bytes,
        };

        let entries = read_entries(bytes)?;
        let manifest_entry = find_manifest(&entries).ok_or(InstallError::ManifestNotFound)?;
        let base = &manifest_entry.path[..manifest_entry.path.len() - MANIFEST_FILE.len()];
        debug!("Manifest found at {:?}, base path {:?}", manifest_entry.path, base);

        let manifest = Manifest::parse_for_install(&String::from_utf8_lossy(&manifest_entry.data))
            .with_context(|| format!("Invalid {} in archive", MANIFEST_FILE))?;

        self.store.ensure_repository()?;
        let target = self.store.version_dir(&manifest.name, &manifest.version)?;

        if runtime.is_dir(&target) {
            info!(
                "{} version {} is already installed",
                manifest.name, manifest.version
            );
            if set_current {
                self.store.set_current(&manifest.name, &manifest.version)?;
            }
            return Ok(manifest);
        }

        let files = stripped_entries(&entries, base)?;
        let staging = staging_dir(&target);
        if runtime.exists(&staging) {
            debug!("Discarding interrupted extraction {:?}", staging);
            runtime.remove_dir_all(&staging)?;
        }
        let extracted = self
            .extract(&files, &staging)
            .and_then(|()| runtime.rename(&staging, &target));
        if let Err(e) = extracted {
            if runtime.is_dir(&staging) {
                runtime.remove_dir_all(&staging)?;
            }
            return Err(e);
        }

        if set_current || self.store.current_version(&manifest.name)?.is_none() {
            self.store.set_current(&manifest.name, &manifest.version)?;
        }

        if delete_source && let ArchiveSource::File(path) = source {
            debug!("Removing archive {:?}", path);
            runtime.remove_file(path)?;
        }

        Ok(manifest)
    }

    fn extract(&self, files: &[(&str, &ArchiveEntry)], target: &Path) -> Result<()> {
        let runtime = self.store.runtime();
        runtime.create_dir_all(target)?;

        for (relative, entry) in files {
            let dest = target.join(relative);
            if !is_path_under(&dest, target) {
                return Err(InstallError::UnsafePath(entry.path.clone()).into());
            }

            if entry.is_dir {
                runtime.create_dir_all(&dest)?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                runtime.create_dir_all(parent)?;
            }
            runtime.write(&dest, &entry.data)?;
            if let Some(modified) = entry.modified
                && let Err(e) = runtime.set_modified(&dest, modified)
            {
                debug!("Failed to set modification time on {:?}: {}", dest, e);
            }
        }
        Ok(())
    }
}

/// Hidden sibling of a version directory that receives the files until
/// extraction is complete.
fn staging_dir(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.partial", name))
}

/// The shallowest manifest entry; ties go to the lexicographically smallest path.
fn find_manifest(entries: &[ArchiveEntry]) -> Option<&ArchiveEntry> {
    entries
        .iter()
        .filter(|e| !e.is_dir)
        .filter(|e| {
            e.path == MANIFEST_FILE || e.path.ends_with(&format!("/{}", MANIFEST_FILE))
        })
        .min_by(|a, b| {
            let depth = |e: &ArchiveEntry| e.path.matches('/').count();
            depth(a).cmp(&depth(b)).then_with(|| a.path.cmp(&b.path))
        })
}

/// Entries under `base` with the prefix removed, all checked before anything is written.
fn stripped_entries<'e>(
    entries: &'e [ArchiveEntry],
    base: &str,
) -> Result<Vec<(&'e str, &'e ArchiveEntry)>, InstallError> {
    let mut files = Vec::new();
    for entry in entries {
        let Some(relative) = entry.path.strip_prefix(base) else {
            continue;
        };
        let relative = if entry.is_dir {
            relative.trim_end_matches('/')
        } else {
            relative
        };
        if relative.is_empty() {
            continue;
        }
        if !is_safe_relative(relative) {
            return Err(InstallError::UnsafePath(entry.path.clone()));
        }
        files.push((relative, entry));
    }
    Ok(files)
}
