use anyhow::Result;
use log::debug;
use reqwest::Client;

use crate::{
    catalog::{Catalog, DEFAULT_REMOTE, HttpCatalog},
    http::HttpClient,
    package::PackageStore,
    repo::{RepositoryLocation, RepositoryLocator},
    runtime::Runtime,
};

/// Flags shared by every command.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Options {
    /// Ignore local repositories and use the global one.
    pub global: bool,
    /// Do not install dependencies of installed libraries.
    pub skip_dependencies: bool,
}

/// Everything a command needs, built once per invocation.
pub struct Config<R: Runtime, C: Catalog> {
    pub runtime: R,
    pub catalog: C,
    pub http: HttpClient,
    pub options: Options,
}

impl<R: Runtime> Config<R, HttpCatalog> {
    pub fn new(runtime: R, remote: Option<String>, options: Options) -> Result<Self> {
        let remote = remote.unwrap_or_else(|| DEFAULT_REMOTE.to_string());

        let client = Client::builder()
            .user_agent(concat!("haxelib/", env!("HAXELIB_VERSION")))
            .build()?;
        let http = HttpClient::new(client);
        let catalog = HttpCatalog::new(http.clone(), &remote);
        debug!("Using catalog at {}", catalog.remote());

        Ok(Self {
            runtime,
            catalog,
            http,
            options,
        })
    }
}

impl<R: Runtime, C: Catalog> Config<R, C> {
    /// The repository this invocation works on.
    pub fn location(&self) -> Result<RepositoryLocation> {
        let cwd = self.runtime.current_dir()?;
        RepositoryLocator::new(&self.runtime).effective(&cwd, self.options.global)
    }

    pub fn store(&self) -> Result<PackageStore<'_, R>> {
        Ok(PackageStore::new(&self.runtime, self.location()?))
    }
}
