use anyhow::{Result, bail};
use log::debug;
use std::path::Path;

use crate::{
    archive::{ArchiveInstaller, ArchiveSource},
    catalog::Catalog,
    resolve::Installer,
    runtime::Runtime,
    vcs::VcsKind,
};

use super::config::Config;

/// Install a library from the catalog, or a local `.zip` archive.
#[tracing::instrument(skip(config))]
pub async fn install<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    name: &str,
    version: Option<&str>,
) -> Result<()> {
    if name.to_ascii_lowercase().ends_with(".zip") {
        return install_local(config, Path::new(name)).await;
    }

    let store = config.store()?;
    let mut installer = Installer::new(&store, &config.catalog, &config.http);
    let manifest = installer.install(name, version, true).await?;
    installer
        .install_dependencies(manifest.dependency_specs()?, config.options.skip_dependencies)
        .await
}

/// Install a local archive. The archive file itself is kept.
#[tracing::instrument(skip(config))]
pub async fn install_local<R: Runtime, C: Catalog>(config: &Config<R, C>, file: &Path) -> Result<()> {
    let file = config.runtime.current_dir()?.join(file);
    if !config.runtime.is_file(&file) {
        bail!("Archive {} not found", file.display());
    }

    let store = config.store()?;
    let manifest =
        ArchiveInstaller::new(&store).install(ArchiveSource::File(&file), true, false)?;
    println!("  installed {} {}", manifest.name, manifest.version);

    let mut installer = Installer::new(&store, &config.catalog, &config.http);
    installer
        .install_dependencies(manifest.dependency_specs()?, config.options.skip_dependencies)
        .await
}

/// Install a library from a Git or Mercurial repository.
#[tracing::instrument(skip(config))]
pub async fn install_vcs<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    kind: VcsKind,
    name: &str,
    url: &str,
    branch: Option<&str>,
    subdir: Option<&str>,
    version: Option<&str>,
) -> Result<()> {
    let store = config.store()?;
    let mut installer = Installer::new(&store, &config.catalog, &config.http);
    let manifest = installer.install_vcs(kind, name, url, branch, subdir, version)?;
    println!("  installed {} {}", name, kind.id());
    installer
        .install_dependencies(manifest.dependency_specs()?, config.options.skip_dependencies)
        .await
}

/// Update one library, or every installed library when `name` is `None`.
#[tracing::instrument(skip(config))]
pub async fn update<R: Runtime, C: Catalog>(config: &Config<R, C>, name: Option<&str>) -> Result<()> {
    let store = config.store()?;
    let mut installer = Installer::new(&store, &config.catalog, &config.http);
    let skip = config.options.skip_dependencies;

    match name {
        Some(name) => {
            if !store.is_installed(name) {
                bail!("Library {} is not installed", name);
            }
            if !installer.update(name, skip).await? {
                println!("{} is up to date", name);
            }
        }
        None => {
            let updated = installer.update_all(skip).await?;
            debug!("Updated {} librar(ies)", updated.len());
            if updated.is_empty() {
                println!("All libraries are up to date");
            }
        }
    }
    Ok(())
}
