//! Package manifest (`haxelib.json`) model.
//!
//! Parsing is syntax-only: malformed JSON is fatal, but absent optional
//! fields are filled in by [`RawManifest::with_defaults`], the single place
//! where every default is stated.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vcs::VcsKind;
use crate::version::{SemVer, VersionError};

/// File name of the manifest inside a package.
pub const MANIFEST_FILE: &str = "haxelib.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to parse {MANIFEST_FILE}: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{MANIFEST_FILE} is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid library name '{0}': only letters, digits, '_', '-' and '.' are allowed")]
    InvalidName(String),
    #[error("{MANIFEST_FILE} declares an invalid version: {0}")]
    InvalidVersion(#[from] VersionError),
    #[error("Invalid {kind} dependency '{value}': expected {kind}:url[#branch[#subdir]]")]
    InvalidVcsDependency { kind: VcsKind, value: String },
}

/// Manifest exactly as written on disk; every field may be absent.
#[derive(Debug, Default, Deserialize)]
pub struct RawManifest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub license: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub releasenote: Option<String>,
    pub contributors: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    #[serde(rename = "classPath")]
    pub class_path: Option<String>,
    pub dependencies: Option<BTreeMap<String, String>>,
    pub main: Option<String>,
}

/// Manifest with defaults applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Manifest {
    pub name: String,
    pub url: String,
    pub license: String,
    pub description: String,
    pub version: String,
    pub releasenote: String,
    pub contributors: Vec<String>,
    pub tags: Vec<String>,
    #[serde(rename = "classPath")]
    pub class_path: String,
    pub dependencies: BTreeMap<String, String>,
    pub main: Option<String>,
}

impl RawManifest {
    pub fn with_defaults(self) -> Manifest {
        Manifest {
            name: self.name.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            license: self.license.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            version: self.version.unwrap_or_default(),
            releasenote: self.releasenote.unwrap_or_default(),
            contributors: self.contributors.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            class_path: self.class_path.unwrap_or_default(),
            dependencies: self.dependencies.unwrap_or_default(),
            main: self.main.filter(|m| !m.is_empty()),
        }
    }
}

impl Manifest {
    /// Parse manifest JSON with syntax-only validation.
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(json)?;
        Ok(raw.with_defaults())
    }

    /// Parse and insist on the fields an installer needs to place the package.
    pub fn parse_for_install(json: &str) -> Result<Self, ManifestError> {
        let manifest = Self::parse(json)?;
        if manifest.name.is_empty() {
            return Err(ManifestError::MissingField("name"));
        }
        if manifest.version.is_empty() {
            return Err(ManifestError::MissingField("version"));
        }
        validate_name(&manifest.name)?;
        SemVer::parse(&manifest.version)?;
        Ok(manifest)
    }

    /// Declared dependencies, decoded.
    pub fn dependency_specs(&self) -> Result<Vec<DependencySpec>, ManifestError> {
        self.dependencies
            .iter()
            .map(|(name, value)| DependencySpec::parse(name, value))
            .collect()
    }
}

/// Reject library names that cannot safely become a directory name.
pub fn validate_name(name: &str) -> Result<(), ManifestError> {
    let valid_chars = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid_chars || name.starts_with('.') {
        return Err(ManifestError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// How a dependency pins its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// A specific version string.
    Exact(String),
    /// Whatever is current, or the latest release when nothing is installed.
    Any,
    /// Acquired from a version-control repository.
    Vcs(VcsKind),
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::Any => write!(f, "any"),
            VersionConstraint::Vcs(kind) => write!(f, "{}", kind),
        }
    }
}

/// One dependency declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub constraint: VersionConstraint,
    pub vcs_url: Option<String>,
    pub vcs_branch: Option<String>,
    pub vcs_subdir: Option<String>,
}

impl DependencySpec {
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: VersionConstraint::Any,
            vcs_url: None,
            vcs_branch: None,
            vcs_subdir: None,
        }
    }

    pub fn exact(name: &str, version: &str) -> Self {
        Self {
            constraint: VersionConstraint::Exact(version.to_string()),
            ..Self::any(name)
        }
    }

    /// Decode a `dependencies` entry.
    ///
    /// An empty value means any version; `git:` / `hg:` prefixed values
    /// carry `url[#branch[#subdir]]`; anything else is an exact version.
    pub fn parse(name: &str, value: &str) -> Result<Self, ManifestError> {
        validate_name(name)?;
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::any(name));
        }

        for kind in [VcsKind::Git, VcsKind::Mercurial] {
            let Some(rest) = value
                .strip_prefix(kind.id())
                .and_then(|r| r.strip_prefix(':'))
            else {
                continue;
            };
            let mut parts = rest.splitn(3, '#');
            let url = parts.next().unwrap_or_default().trim();
            if url.is_empty() || url.starts_with('-') {
                return Err(ManifestError::InvalidVcsDependency {
                    kind,
                    value: value.to_string(),
                });
            }
            let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(String::from);
            return Ok(Self {
                name: name.to_string(),
                constraint: VersionConstraint::Vcs(kind),
                vcs_url: Some(url.to_string()),
                vcs_branch: non_empty(parts.next()),
                vcs_subdir: non_empty(parts.next()),
            });
        }

        Ok(Self::exact(name, value))
    }

    /// The explicitly requested version, if any.
    pub fn exact_version(&self) -> Option<&str> {
        match &self.constraint {
            VersionConstraint::Exact(v) => Some(v),
            _ => None,
        }
    }
}
