use anyhow::Result;
use log::debug;

use crate::{
    catalog::Catalog,
    package::{DEV_VERSION, InstalledLibrary},
    runtime::Runtime,
};

use super::config::Config;

/// List installed libraries, optionally only those whose name contains `filter`.
#[tracing::instrument(skip(config))]
pub fn list<R: Runtime, C: Catalog>(config: &Config<R, C>, filter: Option<&str>) -> Result<()> {
    let store = config.store()?;
    debug!("Listing libraries in {:?}", store.root());

    let filter = filter.map(str::to_lowercase);
    let libraries: Vec<_> = store
        .list_libraries()?
        .into_iter()
        .filter(|lib| {
            filter
                .as_deref()
                .is_none_or(|f| lib.name.to_lowercase().contains(f))
        })
        .collect();

    if libraries.is_empty() {
        println!("No libraries installed.");
        return Ok(());
    }
    for library in &libraries {
        println!("{}", format_library(library));
    }
    Ok(())
}

/// `name: 1.0.0 [1.2.0] git [dev:/path]`, current version in brackets.
fn format_library(library: &InstalledLibrary) -> String {
    let mut line = format!("{}:", library.name);
    for version in &library.versions {
        if library.current.as_deref() == Some(version.as_str()) {
            line.push_str(&format!(" [{}]", version));
        } else {
            line.push_str(&format!(" {}", version));
        }
    }
    if library.current.as_deref() == Some(DEV_VERSION) {
        let path = library
            .dev_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        line.push_str(&format!(" [dev:{}]", path));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn library(versions: &[&str], current: Option<&str>, dev: Option<&str>) -> InstalledLibrary {
        InstalledLibrary {
            name: "foo".into(),
            versions: versions.iter().map(|v| v.to_string()).collect(),
            current: current.map(String::from),
            dev_path: dev.map(PathBuf::from),
        }
    }

    #[test]
    fn test_format_marks_current() {
        let lib = library(&["1.0.0", "1.2.0", "git"], Some("1.2.0"), None);
        assert_eq!(format_library(&lib), "foo: 1.0.0 [1.2.0] git");
    }

    #[test]
    fn test_format_dev_override() {
        let lib = library(&["1.0.0"], Some(DEV_VERSION), Some("/src/foo"));
        assert_eq!(format_library(&lib), "foo: 1.0.0 [dev:/src/foo]");
    }

    #[test]
    fn test_format_without_current() {
        let lib = library(&["1.0.0"], None, None);
        assert_eq!(format_library(&lib), "foo: 1.0.0");
    }
}
