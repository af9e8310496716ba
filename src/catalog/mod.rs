//! Remote library catalog.
//!
//! The catalog answers which versions of a library exist and where their
//! archives live. Everything above it only talks to the [`Catalog`] trait.

mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::version;

pub use http::HttpCatalog;

/// Default catalog server.
pub const DEFAULT_REMOTE: &str = "https://lib.haxe.org";

/// Environment variable overriding the catalog server.
pub const ENV_REMOTE: &str = "HAXELIB_REMOTE";

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("No such library: {0}")]
    UnknownLibrary(String),
    #[error("Library {0} has no released versions")]
    NoVersions(String),
}

/// One published version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReleaseInfo {
    #[serde(rename = "name")]
    pub version: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub comments: String,
}

/// Catalog view of one library.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub license: String,
    /// Version the server marks as current.
    #[serde(rename = "curversion", default)]
    pub current: String,
    #[serde(default)]
    pub versions: Vec<ReleaseInfo>,
}

impl LibraryInfo {
    /// Greatest published version, falling back to the server's current one.
    pub fn latest_version(&self, include_pre: bool) -> Result<String, CatalogError> {
        version::latest(self.versions.iter().map(|r| r.version.as_str()), include_pre)
            .map(|v| v.to_string())
            .or_else(|| (!self.current.is_empty()).then(|| self.current.clone()))
            .ok_or_else(|| CatalogError::NoVersions(self.name.clone()))
    }
}

/// Source of library metadata and archives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch a library's published versions.
    async fn library_info(&self, name: &str) -> Result<LibraryInfo>;

    /// Resolve the version to install when none was requested.
    async fn latest_version(&self, name: &str, include_pre: bool) -> Result<String>;

    /// URL of the archive for one version.
    fn file_url(&self, name: &str, version: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(versions: &[&str], current: &str) -> LibraryInfo {
        LibraryInfo {
            name: "foo".into(),
            desc: String::new(),
            owner: String::new(),
            license: String::new(),
            current: current.into(),
            versions: versions
                .iter()
                .map(|v| ReleaseInfo {
                    version: v.to_string(),
                    date: String::new(),
                    comments: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_latest_version_skips_prereleases() {
        let info = info(&["1.0.0", "1.2.0", "2.0.0-rc.1"], "1.2.0");
        assert_eq!(info.latest_version(false).unwrap(), "1.2.0");
        assert_eq!(info.latest_version(true).unwrap(), "2.0.0-rc.1");
    }

    #[test]
    fn test_latest_version_falls_back_to_current() {
        assert_eq!(info(&["not-semver"], "r42").latest_version(false).unwrap(), "r42");
        assert_eq!(
            info(&[], "").latest_version(false).unwrap_err(),
            CatalogError::NoVersions("foo".into())
        );
    }

    #[test]
    fn test_parse_library_info() {
        let info: LibraryInfo = serde_json::from_str(
            r#"{"name": "foo", "curversion": "1.2.0", "versions": [{"name": "1.2.0", "date": "2024-01-02"}]}"#,
        )
        .unwrap();
        assert_eq!(info.current, "1.2.0");
        assert_eq!(info.versions[0].version, "1.2.0");
        assert_eq!(info.versions[0].comments, "");
    }
}
