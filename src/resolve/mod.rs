//! Dependency resolution over installed libraries, and dependency installation.
//!
//! [`resolve`] only looks at what is on disk. Fetching missing libraries is
//! the job of [`Installer`], which callers run first.

mod installer;

use std::path::PathBuf;

use anyhow::Result;
use log::debug;
use thiserror::Error;

use crate::manifest::Manifest;
use crate::package::{DEV_VERSION, PackageError, PackageStore};
use crate::runtime::Runtime;

pub use installer::Installer;

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Library {name} version {version} is not installed")]
    NotInstalled { name: String, version: String },
    #[error("Library {name} has two versions included: {v1} and {v2}")]
    VersionConflict { name: String, v1: String, v2: String },
}

/// One library selected by resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionNode {
    pub project: String,
    pub version: String,
    /// Directory holding the library's sources.
    pub path: PathBuf,
    pub manifest: Option<Manifest>,
}

impl ResolutionNode {
    /// Source directory including the manifest's `classPath`.
    pub fn class_path(&self) -> PathBuf {
        match &self.manifest {
            Some(m) if !m.class_path.is_empty() => {
                self.path.join(m.class_path.trim_start_matches(['/', '\\']))
            }
            _ => self.path.clone(),
        }
    }
}

/// Resolved libraries keyed by name, in the order they were reached.
#[derive(Debug, Default, Clone)]
pub struct Resolution {
    nodes: Vec<ResolutionNode>,
}

impl Resolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ResolutionNode> {
        self.nodes.iter().find(|n| n.project == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolutionNode> {
        self.nodes.iter()
    }
}

/// Add `name` (at `version`, or its current version) to `into`, then its
/// dependencies when `recurse` is set.
///
/// Names already present are not visited again, which ends cycles and
/// diamonds; asking for a different version of one is a conflict.
#[tracing::instrument(skip(store, into))]
pub fn resolve<R: Runtime>(
    store: &PackageStore<'_, R>,
    name: &str,
    version: Option<&str>,
    into: &mut Resolution,
    recurse: bool,
) -> Result<()> {
    if let Some(existing) = into.get(name) {
        return match version {
            Some(v) if v != existing.version => Err(ResolveError::VersionConflict {
                name: name.to_string(),
                v1: existing.version.clone(),
                v2: v.to_string(),
            }
            .into()),
            _ => Ok(()),
        };
    }

    let (version, path) = locate(store, name, version)?;
    let manifest = store.read_manifest(&path)?;
    debug!("Resolved {} {} at {:?}", name, version, path);

    let dependencies = match (&manifest, recurse) {
        (Some(m), true) => m.dependency_specs()?,
        _ => vec![],
    };
    into.nodes.push(ResolutionNode {
        project: name.to_string(),
        version,
        path,
        manifest,
    });

    for dep in dependencies {
        resolve(store, &dep.name, dep.exact_version(), into, true)?;
    }
    Ok(())
}

/// Find the installed directory for a library without touching the network.
fn locate<R: Runtime>(
    store: &PackageStore<'_, R>,
    name: &str,
    version: Option<&str>,
) -> Result<(String, PathBuf)> {
    let not_installed = |version: &str| ResolveError::NotInstalled {
        name: name.to_string(),
        version: version.to_string(),
    };

    if matches!(version, None | Some(DEV_VERSION))
        && let Some(dev) = store.dev_path(name)?
        && !store.is_dev_path_excluded(&dev)
    {
        return Ok((DEV_VERSION.to_string(), dev));
    }

    let version = match version {
        Some(v) => v.to_string(),
        None => store
            .current_version(name)?
            .ok_or_else(|| not_installed("current"))?,
    };
    match store.library_path(name, Some(&version)) {
        Ok(path) => Ok((version, path)),
        Err(e) if e.downcast_ref::<PackageError>().is_some() => Err(not_installed(&version).into()),
        Err(e) => Err(e),
    }
}
