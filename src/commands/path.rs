use anyhow::Result;
use std::path::{MAIN_SEPARATOR, Path};

use crate::{
    catalog::Catalog,
    resolve::{Resolution, ResolutionNode, resolve},
    runtime::Runtime,
};

use super::config::Config;

/// Split `name[:version]`.
fn parse_library_arg(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once(':') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (arg, None),
    }
}

/// Resolve libraries with their dependencies and print the compiler arguments for them.
#[tracing::instrument(skip(config))]
pub fn path<R: Runtime, C: Catalog>(config: &Config<R, C>, libraries: &[String]) -> Result<()> {
    let store = config.store()?;
    let mut resolution = Resolution::new();
    for arg in libraries {
        let (name, version) = parse_library_arg(arg);
        resolve(&store, name, version, &mut resolution, true)?;
    }
    for line in compiler_args(&resolution) {
        println!("{}", line);
    }
    Ok(())
}

fn compiler_args(resolution: &Resolution) -> Vec<String> {
    resolution.iter().flat_map(node_args).collect()
}

fn node_args(node: &ResolutionNode) -> [String; 2] {
    [
        with_trailing_separator(&node.class_path()),
        format!("-D {}={}", node.project, node.version),
    ]
}

fn with_trailing_separator(path: &Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with(['/', '\\']) {
        s.push(MAIN_SEPARATOR);
    }
    s
}

/// Print the root directory of each library's active version.
#[tracing::instrument(skip(config))]
pub fn libpath<R: Runtime, C: Catalog>(config: &Config<R, C>, libraries: &[String]) -> Result<()> {
    let store = config.store()?;
    for arg in libraries {
        let (name, version) = parse_library_arg(arg);
        let dir = store.library_path(name, version)?;
        println!("{}", with_trailing_separator(&dir));
    }
    Ok(())
}
