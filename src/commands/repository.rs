use anyhow::Result;
use log::debug;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use crate::{
    catalog::Catalog,
    repo::{RepositoryError, RepositoryLocator},
    runtime::Runtime,
};

use super::config::Config;

/// Directory name used for the global repository when none is given.
const DEFAULT_REPO_DIR: &str = "haxelib";

/// Configure the global repository path, creating the directory.
///
/// Without a path the currently configured one is kept, falling back to
/// `<home>/haxelib`.
#[tracing::instrument(skip(config))]
pub fn setup<R: Runtime, C: Catalog>(config: &Config<R, C>, path: Option<&Path>) -> Result<()> {
    let locator = RepositoryLocator::new(&config.runtime);
    let target: PathBuf = match path {
        Some(path) => path.to_path_buf(),
        None => match locator.global_unchecked() {
            Ok(location) => location.path,
            Err(e) => {
                debug!("No global repository yet: {}", e);
                config
                    .runtime
                    .home_dir()
                    .ok_or(RepositoryError::NoHomeDir)?
                    .join(DEFAULT_REPO_DIR)
            }
        },
    };

    let saved = locator.save_global(&target)?;
    println!("haxelib repository is now {}", saved.display());
    Ok(())
}

/// Print the repository this invocation would use.
#[tracing::instrument(skip(config))]
pub fn print_config<R: Runtime, C: Catalog>(config: &Config<R, C>) -> Result<()> {
    let location = config.location()?;
    debug!("Repository provenance: {}", location.provenance);
    let mut path = location.path.display().to_string();
    if !path.ends_with(['/', '\\']) {
        path.push(MAIN_SEPARATOR);
    }
    println!("{}", path);
    Ok(())
}

/// Create a local repository in the working directory.
#[tracing::instrument(skip(config))]
pub fn newrepo<R: Runtime, C: Catalog>(config: &Config<R, C>) -> Result<()> {
    let cwd = config.runtime.current_dir()?;
    let marker = RepositoryLocator::new(&config.runtime).create_local(&cwd)?;
    println!("Local repository created ({})", marker.display());
    Ok(())
}

/// Delete the local repository in the working directory.
#[tracing::instrument(skip(config))]
pub fn deleterepo<R: Runtime, C: Catalog>(config: &Config<R, C>) -> Result<()> {
    let cwd = config.runtime.current_dir()?;
    let marker = RepositoryLocator::new(&config.runtime).delete_local(&cwd)?;
    println!("Local repository deleted ({})", marker.display());
    Ok(())
}
