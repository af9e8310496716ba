//! Package store for managing installed libraries in a repository.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::manifest::{MANIFEST_FILE, Manifest, validate_name};
use crate::repo::{RepositoryError, RepositoryLocation};
use crate::runtime::Runtime;
use crate::runtime::path::{normalize_for_compare, normalize_path};
use crate::version::{self, SemVer};

use super::{
    CURRENT_FILE, DEV_FILE, DEV_VERSION, ENV_DEV_FILTER, InstalledLibrary, PackageError,
    interpolate_env,
};

/// Store owning the on-disk layout of one repository.
///
/// Reads never mutate; every mutation first re-checks that the repository
/// directory still exists.
pub struct PackageStore<'a, R: Runtime> {
    runtime: &'a R,
    location: RepositoryLocation,
}

impl<'a, R: Runtime> PackageStore<'a, R> {
    pub fn new(runtime: &'a R, location: RepositoryLocation) -> Self {
        Self { runtime, location }
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    pub fn location(&self) -> &RepositoryLocation {
        &self.location
    }

    /// Get the repository root directory.
    pub fn root(&self) -> &Path {
        &self.location.path
    }

    /// Get the directory of a library.
    ///
    /// Returns: `<root>/<escaped-name>`
    pub fn library_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root().join(version::escape(name)))
    }

    /// Get the directory of one installed version.
    ///
    /// Returns: `<root>/<escaped-name>/<escaped-version>`. Versions that are
    /// not a single plain path segment are rejected.
    pub fn version_dir(&self, name: &str, version: &str) -> Result<PathBuf> {
        let dir = self.library_dir(name)?;
        version::validate_segment(version)?;
        Ok(dir.join(version::escape(version)))
    }

    fn current_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.library_dir(name)?.join(CURRENT_FILE))
    }

    fn dev_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.library_dir(name)?.join(DEV_FILE))
    }

    /// Fail with [`RepositoryError::Deleted`] if the repository vanished.
    pub fn ensure_repository(&self) -> Result<()> {
        if !self.runtime.is_dir(self.root()) {
            return Err(RepositoryError::Deleted(self.root().to_path_buf()).into());
        }
        Ok(())
    }

    /// Whether the library is installed and usable: its directory exists and
    /// carries a current pointer or a dev pointer.
    pub fn is_installed(&self, name: &str) -> bool {
        let (Ok(current), Ok(dev)) = (self.current_file(name), self.dev_file(name)) else {
            return false;
        };
        self.runtime.is_file(&current) || self.runtime.is_file(&dev)
    }

    /// Check if a specific version directory exists.
    pub fn has_version(&self, name: &str, version: &str) -> bool {
        self.version_dir(name, version)
            .map(|dir| self.runtime.is_dir(&dir))
            .unwrap_or(false)
    }

    /// List installed versions: semantic versions ascending, then opaque tags
    /// in directory-listing order.
    pub fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        let dir = self.library_dir(name)?;
        if !self.runtime.is_dir(&dir) {
            return Ok(vec![]);
        }

        let mut semantic = Vec::new();
        let mut opaque = Vec::new();
        for entry in self.runtime.read_dir(&dir)? {
            let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') || !self.runtime.is_dir(&entry) {
                continue;
            }
            let version = version::unescape(file_name);
            match SemVer::parse(&version) {
                Ok(parsed) => semantic.push((parsed, version)),
                Err(_) => opaque.push(version),
            }
        }

        semantic.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(semantic
            .into_iter()
            .map(|(_, v)| v)
            .chain(opaque)
            .collect())
    }

    /// Read the current-pointer file, ignoring any dev override.
    pub fn current_version(&self, name: &str) -> Result<Option<String>> {
        let file = self.current_file(name)?;
        if !self.runtime.is_file(&file) {
            return Ok(None);
        }
        let content = self.runtime.read_to_string(&file)?;
        let version = content.trim();
        Ok((!version.is_empty()).then(|| version.to_string()))
    }

    /// Current version of a library, or [`DEV_VERSION`] while a dev override
    /// file is present (whether or not its target exists).
    pub fn current(&self, name: &str) -> Result<String> {
        let dir = self.library_dir(name)?;
        if !self.runtime.is_dir(&dir) {
            return Err(PackageError::NotInstalled(name.to_string()).into());
        }
        if self.runtime.is_file(&self.dev_file(name)?) {
            return Ok(DEV_VERSION.to_string());
        }
        self.current_version(name)?
            .ok_or_else(|| PackageError::NotInstalled(name.to_string()).into())
    }

    /// Point the library at an installed version. Setting the value it
    /// already has is a no-op.
    #[tracing::instrument(skip(self))]
    pub fn set_current(&self, name: &str, version: &str) -> Result<()> {
        self.ensure_repository()?;
        if !self.has_version(name, version) {
            return Err(PackageError::VersionNotInstalled {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        if self.current_version(name)?.as_deref() == Some(version) {
            debug!("{} is already at {}", name, version);
            return Ok(());
        }
        let file = self.current_file(name)?;
        self.write_pointer(&file, version)
            .with_context(|| format!("Failed to set current version of {}", name))
    }

    /// Replace a pointer file in one step: write a sibling, then rename it over.
    fn write_pointer(&self, file: &Path, value: &str) -> Result<()> {
        let mut staged = file.as_os_str().to_owned();
        staged.push(".tmp");
        let staged = PathBuf::from(staged);
        self.runtime.write(&staged, value.as_bytes())?;
        self.runtime.rename(&staged, file)
    }

    /// Store a development override path, creating the library directory if needed.
    ///
    /// The path is stored as given; `%VAR%` references are expanded on read.
    #[tracing::instrument(skip(self))]
    pub fn set_dev(&self, name: &str, path: &str) -> Result<()> {
        self.ensure_repository()?;
        let dir = self.library_dir(name)?;
        if !self.runtime.is_dir(&dir) {
            self.runtime.create_dir_all(&dir)?;
        }
        self.write_pointer(&self.dev_file(name)?, path.trim())
            .with_context(|| format!("Failed to set development directory of {}", name))
    }

    /// Remove the development override. Clearing an unset override is a no-op.
    #[tracing::instrument(skip(self))]
    pub fn clear_dev(&self, name: &str) -> Result<()> {
        self.ensure_repository()?;
        let file = self.dev_file(name)?;
        if self.runtime.is_file(&file) {
            self.runtime.remove_file(&file)?;
        }
        Ok(())
    }

    /// Development override path with environment references expanded.
    pub fn dev_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let file = self.dev_file(name)?;
        if !self.runtime.is_file(&file) {
            return Ok(None);
        }
        let raw = self.runtime.read_to_string(&file)?;
        let expanded = interpolate_env(raw.trim(), |var| self.runtime.env_var(var).ok());
        Ok((!expanded.is_empty()).then(|| PathBuf::from(expanded)))
    }

    /// Whether `path` falls outside the operator's dev-override allow-list.
    ///
    /// Without a filter every path is allowed.
    pub fn is_dev_path_excluded(&self, path: &Path) -> bool {
        let Ok(filter) = self.runtime.env_var(ENV_DEV_FILTER) else {
            return false;
        };
        let target = normalize_for_compare(&path.to_string_lossy());
        let allowed: Vec<String> = filter
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(normalize_for_compare)
            .collect();
        if allowed.is_empty() {
            return false;
        }
        !allowed.iter().any(|prefix| target.starts_with(prefix.as_str()))
    }

    /// Delete one installed version.
    ///
    /// The current version and the version hosting the dev override are protected.
    #[tracing::instrument(skip(self))]
    pub fn remove_version(&self, name: &str, version: &str) -> Result<()> {
        self.ensure_repository()?;
        let dir = self.version_dir(name, version)?;
        if !self.runtime.is_dir(&dir) {
            return Err(PackageError::VersionNotInstalled {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        if self.current_version(name)?.as_deref() == Some(version) {
            return Err(PackageError::CurrentVersionProtected {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        if let Some(dev) = self.dev_path(name)?
            && normalize_path(&dev) == normalize_path(&dir)
        {
            return Err(PackageError::DevVersionProtected {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }

        debug!("Removing version directory {:?}", dir);
        self.runtime.remove_dir_all(&dir)
    }

    /// Delete a library with all of its versions.
    #[tracing::instrument(skip(self))]
    pub fn remove_library(&self, name: &str) -> Result<()> {
        self.ensure_repository()?;
        let dir = self.library_dir(name)?;
        if !self.runtime.is_dir(&dir) {
            return Err(PackageError::NotInstalled(name.to_string()).into());
        }
        debug!("Removing library directory {:?}", dir);
        self.runtime.remove_dir_all(&dir)
    }

    /// Greatest installed semantic version.
    pub fn latest_version(&self, name: &str, include_pre: bool) -> Result<Option<String>> {
        let versions = self.list_versions(name)?;
        Ok(version::latest(versions.iter().map(String::as_str), include_pre)
            .map(|v| v.to_string()))
    }

    /// Snapshot of a library's versions and pointers.
    pub fn library_info(&self, name: &str) -> Result<InstalledLibrary> {
        let dir = self.library_dir(name)?;
        if !self.runtime.is_dir(&dir) {
            return Err(PackageError::NotInstalled(name.to_string()).into());
        }
        let dev_path = self.dev_path(name)?;
        let current = if self.runtime.is_file(&self.dev_file(name)?) {
            Some(DEV_VERSION.to_string())
        } else {
            self.current_version(name)?
        };
        Ok(InstalledLibrary {
            name: name.to_string(),
            versions: self.list_versions(name)?,
            current,
            dev_path,
        })
    }

    /// Every library directory in the repository, sorted by name
    /// (case-insensitive). Unreadable entries are skipped with a warning.
    pub fn list_libraries(&self) -> Result<Vec<InstalledLibrary>> {
        if !self.runtime.is_dir(self.root()) {
            return Ok(vec![]);
        }
        let mut libraries = Vec::new();
        for entry in self.runtime.read_dir(self.root())? {
            let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') || !self.runtime.is_dir(&entry) {
                continue;
            }
            let name = version::unescape(file_name);
            match self.library_info(&name) {
                Ok(info) => libraries.push(info),
                Err(e) => warn!("Skipping {:?}: {}", entry, e),
            }
        }
        libraries.sort_by_key(|lib| lib.name.to_lowercase());
        Ok(libraries)
    }

    /// Directory holding the active sources of a library.
    ///
    /// Without an explicit version an allowed dev override wins, then the
    /// current version.
    pub fn library_path(&self, name: &str, version: Option<&str>) -> Result<PathBuf> {
        if version.is_none()
            && let Some(dev) = self.dev_path(name)?
        {
            if !self.is_dev_path_excluded(&dev) {
                return Ok(dev);
            }
            debug!("Ignoring development directory {:?} of {}", dev, name);
        }

        let version = match version {
            Some(v) => v.to_string(),
            None => self
                .current_version(name)?
                .ok_or_else(|| PackageError::NotInstalled(name.to_string()))?,
        };
        let dir = self.version_dir(name, &version)?;
        if !self.runtime.is_dir(&dir) {
            return Err(PackageError::VersionNotInstalled {
                name: name.to_string(),
                version,
            }
            .into());
        }
        Ok(dir)
    }

    /// [`library_path`](Self::library_path) joined with the manifest's `classPath`.
    pub fn class_path(&self, name: &str, version: Option<&str>) -> Result<PathBuf> {
        let dir = self.library_path(name, version)?;
        match self.read_manifest(&dir)? {
            Some(manifest) if !manifest.class_path.is_empty() => {
                Ok(dir.join(manifest.class_path.trim_start_matches(['/', '\\'])))
            }
            _ => Ok(dir),
        }
    }

    /// Read the manifest at the top of a package directory, if there is one.
    pub fn read_manifest(&self, dir: &Path) -> Result<Option<Manifest>> {
        let file = dir.join(MANIFEST_FILE);
        if !self.runtime.is_file(&file) {
            return Ok(None);
        }
        let content = self.runtime.read_to_string(&file)?;
        let manifest =
            Manifest::parse(&content).with_context(|| format!("Invalid manifest {:?}", file))?;
        Ok(Some(manifest))
    }
}
