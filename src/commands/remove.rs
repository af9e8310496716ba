use anyhow::Result;
use log::debug;

use crate::{catalog::Catalog, runtime::Runtime};

use super::config::Config;

/// Remove one version of a library, or the whole library.
#[tracing::instrument(skip(config))]
pub fn remove<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    name: &str,
    version: Option<&str>,
) -> Result<()> {
    let store = config.store()?;
    debug!("Removing from {:?}", store.root());

    match version {
        Some(version) => {
            store.remove_version(name, version)?;
            println!("Library {} version {} removed", name, version);
        }
        None => {
            store.remove_library(name)?;
            println!("Library {} removed", name);
        }
    }
    Ok(())
}
