//! Installed-library store.
//!
//! On-disk layout under a repository root:
//!
//! ```text
//! <root>/<escaped-name>/<escaped-version>/...   one directory per installed version
//! <root>/<escaped-name>/.current                 active version (plain text)
//! <root>/<escaped-name>/.dev                     development override path (plain text)
//! ```

mod interpolate;
mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use interpolate::interpolate_env;
pub use store::PackageStore;

/// File holding the active version of a library.
pub const CURRENT_FILE: &str = ".current";

/// File holding the development override path of a library.
pub const DEV_FILE: &str = ".dev";

/// Value reported as the current version while a dev override is active.
pub const DEV_VERSION: &str = "dev";

/// Environment variable restricting which directories may serve as dev overrides.
pub const ENV_DEV_FILTER: &str = "HAXELIB_DEV_FILTER";

#[derive(Debug, Error, PartialEq)]
pub enum PackageError {
    #[error("Library {0} is not installed")]
    NotInstalled(String),
    #[error("Library {name} version {version} is not installed")]
    VersionNotInstalled { name: String, version: String },
    #[error("Cannot remove version {version} of {name}: it is the current version")]
    CurrentVersionProtected { name: String, version: String },
    #[error("Cannot remove version {version} of {name}: it is the development override")]
    DevVersionProtected { name: String, version: String },
}

/// Snapshot of one library directory.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledLibrary {
    pub name: String,
    /// Semantic versions ascending, followed by opaque tags.
    pub versions: Vec<String>,
    /// Current version, or [`DEV_VERSION`] while a dev override is set.
    pub current: Option<String>,
    /// Resolved development override path.
    pub dev_path: Option<PathBuf>,
}

impl InstalledLibrary {
    /// Whether the library is usable for dependency purposes.
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }
}
