//! Version-control backends used for git/hg installs.
//!
//! The set of backends is closed: [`VcsKind`] names each one and
//! [`Vcs`] dispatches on it.

mod backend;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::runtime::Runtime;

pub use backend::Vcs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Mercurial,
}

impl VcsKind {
    /// Identifier used in dependency strings and as the working-copy directory name.
    pub fn id(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Mercurial => "hg",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VcsKind::Git => "Git",
            VcsKind::Mercurial => "Mercurial",
        }
    }

    pub fn executable(&self) -> &'static str {
        self.id()
    }

    /// Metadata directory found at the top of a working copy.
    pub fn marker_dir(&self) -> &'static str {
        match self {
            VcsKind::Git => ".git",
            VcsKind::Mercurial => ".hg",
        }
    }

    pub fn all() -> [VcsKind; 2] {
        [VcsKind::Git, VcsKind::Mercurial]
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for VcsKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsKind::Git),
            "hg" => Ok(VcsKind::Mercurial),
            _ => anyhow::bail!("Unknown version control system: {}. Expected git or hg.", s),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum VcsError {
    #[error("Could not use {0}, please make sure it is installed and available in your PATH")]
    Unavailable(VcsKind),
    #[error("Could not clone {kind} repository {url}: {stderr}")]
    CantClone {
        kind: VcsKind,
        url: String,
        stderr: String,
    },
    #[error("Could not checkout {kind} branch, tag or path '{branch}': {stderr}")]
    CantCheckoutBranch {
        kind: VcsKind,
        branch: String,
        stderr: String,
    },
    #[error("Could not checkout {kind} version '{version}': {stderr}")]
    CantCheckoutVersion {
        kind: VcsKind,
        version: String,
        stderr: String,
    },
    #[error("Could not update {kind} working copy: {stderr}")]
    CantUpdate { kind: VcsKind, stderr: String },
}

/// Find a VCS working copy under a library root.
///
/// Returns the backend and the working-copy directory, or `None` when the
/// library is not VCS-managed.
pub fn detect<R: Runtime>(runtime: &R, library_dir: &Path) -> Option<(VcsKind, PathBuf)> {
    VcsKind::all().into_iter().find_map(|kind| {
        let working_copy = library_dir.join(kind.id());
        runtime
            .is_dir(&working_copy.join(kind.marker_dir()))
            .then_some((kind, working_copy))
    })
}
