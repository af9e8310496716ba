use anyhow::{Result, bail};
use log::debug;

use crate::{
    catalog::Catalog,
    runtime::{ProcessCommand, Runtime},
};

use super::config::Config;

/// Set to `1` in the environment of a library's run script.
pub const ENV_RUN: &str = "HAXELIB_RUN";

/// Name of the library whose run script is executing.
pub const ENV_LIBNAME: &str = "HAXELIB_LIBNAME";

/// Compiled run script shipped inside a library.
const RUN_SCRIPT: &str = "run.n";

/// Run a library's script and return its exit code.
///
/// A bundled `run.n` runs through `neko` and receives the caller's working
/// directory as its last argument. Otherwise the manifest's `main` class runs
/// through `haxe --run`.
#[tracing::instrument(skip(config))]
pub fn run<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    name: &str,
    version: Option<&str>,
    args: &[String],
) -> Result<i32> {
    let store = config.store()?;
    let dir = store.library_path(name, version)?;
    let manifest = store.read_manifest(&dir)?;
    let cwd = config.runtime.current_dir()?;

    let command = if config.runtime.is_file(&dir.join(RUN_SCRIPT)) {
        ProcessCommand::new("neko")
            .arg(RUN_SCRIPT)
            .args(args.iter().cloned())
            .arg(cwd.to_string_lossy().into_owned())
            .current_dir(&dir)
    } else if let Some(main) = manifest.and_then(|m| m.main) {
        let library = match version {
            Some(v) => format!("{}:{}", name, v),
            None => name.to_string(),
        };
        ProcessCommand::new("haxe")
            .args(["--library", library.as_str(), "--run", main.as_str()])
            .args(args.iter().cloned())
            .current_dir(&cwd)
    } else {
        bail!("Library {} has no run script", name);
    };

    let command = command.env(ENV_RUN, "1").env(ENV_LIBNAME, name);
    debug!("Running {:?}", command);
    config.runtime.run_interactive(&command)
}
