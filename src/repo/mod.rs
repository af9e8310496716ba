//! Repository location: which directory holds installed libraries.
//!
//! A location is recomputed for every invocation, since both the
//! environment and the working directory may change between runs.

mod locator;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use locator::RepositoryLocator;

/// Name of the directory marking a project-local repository.
pub const REPO_MARKER: &str = ".haxelib";

/// Environment variable overriding the global repository path.
pub const ENV_REPO_PATH: &str = "HAXELIB_PATH";

/// File name of the per-user config file holding the global repository path.
pub const CONFIG_FILE: &str = ".haxelib";

/// System-wide config file consulted on non-Windows hosts.
#[cfg(not(windows))]
pub const SYSTEM_CONFIG_FILE: &str = "/etc/.haxelib";

#[derive(Debug, Error, PartialEq)]
pub enum RepositoryError {
    #[error("This is the first time you are running haxelib. Please run `haxelib setup` first")]
    NotConfigured,
    #[error("Repository path {0:?} does not exist")]
    Missing(PathBuf),
    #[error("Repository path {0:?} is a file, not a directory")]
    NotADirectory(PathBuf),
    #[error("Repository {0:?} was deleted while haxelib was running")]
    Deleted(PathBuf),
    #[error("Cannot use {0:?}: it is the haxelib config file itself")]
    ReservedPath(PathBuf),
    #[error("A local repository already exists in {0:?}")]
    LocalExists(PathBuf),
    #[error("No local repository found in {0:?}")]
    LocalMissing(PathBuf),
    #[error("Cannot determine the home directory to store haxelib settings")]
    NoHomeDir,
}

/// Where a repository path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    EnvironmentOverride,
    LocalMarkerFound,
    GlobalConfig,
    PlatformDefault,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::EnvironmentOverride => write!(f, "{}", ENV_REPO_PATH),
            Provenance::LocalMarkerFound => write!(f, "local"),
            Provenance::GlobalConfig => write!(f, "config"),
            Provenance::PlatformDefault => write!(f, "default"),
        }
    }
}

/// An absolute repository directory and how it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryLocation {
    pub path: PathBuf,
    pub provenance: Provenance,
}

impl RepositoryLocation {
    pub fn new(path: impl Into<PathBuf>, provenance: Provenance) -> Self {
        Self {
            path: path.into(),
            provenance,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
