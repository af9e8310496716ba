//! Finding, validating and persisting the repository path.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, normalize_path};

use super::{
    CONFIG_FILE, ENV_REPO_PATH, Provenance, REPO_MARKER, RepositoryError, RepositoryLocation,
};

/// Resolves which directory is "the repository" for this invocation.
pub struct RepositoryLocator<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> RepositoryLocator<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Path of the per-user config file holding the global repository path.
    pub fn config_file(&self) -> Result<PathBuf> {
        let home = self.runtime.home_dir().ok_or(RepositoryError::NoHomeDir)?;
        Ok(home.join(CONFIG_FILE))
    }

    /// Walk upward from `start` looking for a local repository marker directory.
    #[tracing::instrument(skip(self))]
    pub fn find_local(&self, start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(REPO_MARKER);
            if self.runtime.is_dir(&candidate) {
                debug!("Found local repository at {:?}", candidate);
                return Some(candidate);
            }
            dir = current.parent();
        }
        None
    }

    /// Resolve the global repository without checking that it exists.
    ///
    /// Used before the repository is created (e.g. by `setup`).
    #[tracing::instrument(skip(self))]
    pub fn global_unchecked(&self) -> Result<RepositoryLocation> {
        if let Ok(value) = self.runtime.env_var(ENV_REPO_PATH) {
            let value = value.trim();
            if !value.is_empty() {
                debug!("Using repository from {}: {}", ENV_REPO_PATH, value);
                return Ok(RepositoryLocation::new(
                    value,
                    Provenance::EnvironmentOverride,
                ));
            }
        }

        if let Some(home) = self.runtime.home_dir() {
            let config = home.join(CONFIG_FILE);
            if let Some(path) = self.read_path_file(&config)? {
                return Ok(RepositoryLocation::new(path, Provenance::GlobalConfig));
            }
        }

        #[cfg(not(windows))]
        {
            let system = Path::new(super::SYSTEM_CONFIG_FILE);
            if let Some(path) = self.read_path_file(system)? {
                return Ok(RepositoryLocation::new(path, Provenance::GlobalConfig));
            }
            Err(RepositoryError::NotConfigured.into())
        }

        #[cfg(windows)]
        {
            let path = self.platform_default()?;
            if !self.runtime.exists(&path) {
                self.runtime.create_dir_all(&path)?;
            }
            Ok(RepositoryLocation::new(path, Provenance::PlatformDefault))
        }
    }

    /// Resolve the global repository and make sure it is a usable directory.
    ///
    /// A path taken from the environment override is used verbatim.
    pub fn global(&self) -> Result<RepositoryLocation> {
        let location = self.global_unchecked()?;
        if location.provenance == Provenance::EnvironmentOverride {
            return Ok(location);
        }
        self.validate(&location.path)?;
        Ok(location)
    }

    /// The repository used by a normal invocation.
    ///
    /// A local marker found above `start` wins unless `force_global` is set.
    pub fn effective(&self, start: &Path, force_global: bool) -> Result<RepositoryLocation> {
        if !force_global && let Some(local) = self.find_local(start) {
            return Ok(RepositoryLocation::new(local, Provenance::LocalMarkerFound));
        }
        self.global()
    }

    /// Persist `path` as the global repository, creating it if needed.
    #[tracing::instrument(skip(self))]
    pub fn save_global(&self, path: &Path) -> Result<PathBuf> {
        let path = if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.runtime.current_dir()?.join(path))
        };

        let config = self.config_file()?;
        if path == normalize_path(&config) {
            return Err(RepositoryError::ReservedPath(path).into());
        }

        if !self.runtime.exists(&path) {
            self.runtime
                .create_dir_all(&path)
                .with_context(|| format!("Failed to create repository at {:?}", path))?;
        } else if !self.runtime.is_dir(&path) {
            return Err(RepositoryError::NotADirectory(path).into());
        }

        self.runtime
            .write(&config, path.to_string_lossy().as_bytes())
            .with_context(|| format!("Failed to save settings to {:?}", config))?;
        debug!("Saved global repository {:?} to {:?}", path, config);
        Ok(path)
    }

    /// Create a local repository marker in exactly `dir`.
    pub fn create_local(&self, dir: &Path) -> Result<PathBuf> {
        let marker = dir.join(REPO_MARKER);
        if self.runtime.exists(&marker) {
            return Err(RepositoryError::LocalExists(dir.to_path_buf()).into());
        }
        self.runtime.create_dir_all(&marker)?;
        Ok(marker)
    }

    /// Delete the local repository marker in exactly `dir`, with everything in it.
    pub fn delete_local(&self, dir: &Path) -> Result<PathBuf> {
        let marker = dir.join(REPO_MARKER);
        if !self.runtime.is_dir(&marker) {
            return Err(RepositoryError::LocalMissing(dir.to_path_buf()).into());
        }
        self.runtime.remove_dir_all(&marker)?;
        Ok(marker)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if !self.runtime.exists(path) {
            return Err(RepositoryError::Missing(path.to_path_buf()).into());
        }
        if !self.runtime.is_dir(path) {
            return Err(RepositoryError::NotADirectory(path.to_path_buf()).into());
        }
        Ok(())
    }

    /// Read a single-line path file, `None` when absent or blank.
    fn read_path_file(&self, file: &Path) -> Result<Option<PathBuf>> {
        if !self.runtime.is_file(file) {
            return Ok(None);
        }
        let content = self.runtime.read_to_string(file)?;
        let line = content.lines().next().unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(line)))
    }

    #[cfg(windows)]
    fn platform_default(&self) -> Result<PathBuf> {
        if let Ok(haxepath) = self.runtime.env_var("HAXEPATH") {
            let haxepath = haxepath.trim();
            if !haxepath.is_empty() {
                return Ok(Path::new(haxepath).join("lib"));
            }
        }
        let base = self
            .runtime
            .data_local_dir()
            .ok_or(RepositoryError::NoHomeDir)?;
        Ok(base.join("haxelib").join("lib"))
    }
}
