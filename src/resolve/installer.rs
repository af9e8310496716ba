use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::archive::{ArchiveInstaller, ArchiveSource};
use crate::catalog::Catalog;
use crate::http::HttpClient;
use crate::manifest::{DependencySpec, Manifest, VersionConstraint};
use crate::package::PackageStore;
use crate::runtime::Runtime;
use crate::vcs::{self, Vcs, VcsKind};
use crate::version::{self, SemVer};

/// Acquires libraries from the catalog or from version control.
///
/// One `Installer` lives for one command invocation. It remembers which VCS
/// libraries it already processed (and on which branch) so a library reached
/// through several dependency paths is only handled once.
pub struct Installer<'s, 'a, R: Runtime, C: Catalog> {
    store: &'s PackageStore<'a, R>,
    catalog: &'s C,
    http: &'s HttpClient,
    vcs_branches: HashMap<String, Option<String>>,
}

impl<'s, 'a, R: Runtime, C: Catalog> Installer<'s, 'a, R, C> {
    pub fn new(store: &'s PackageStore<'a, R>, catalog: &'s C, http: &'s HttpClient) -> Self {
        Self {
            store,
            catalog,
            http,
            vcs_branches: HashMap::new(),
        }
    }

    /// Install one catalog version.
    ///
    /// The latest release is used when `version` is `None`, empty or `unset`.
    #[tracing::instrument(skip(self))]
    pub async fn install(
        &mut self,
        name: &str,
        version: Option<&str>,
        set_current: bool,
    ) -> Result<Manifest> {
        let requested = version.map(SemVer::parse_optional).transpose()?.flatten();
        let version = match requested {
            Some(v) => v.to_string(),
            None => self.catalog.latest_version(name, false).await?,
        };

        if self.store.has_version(name, &version) {
            println!("  installed {} {} (already)", name, version);
            if set_current {
                self.store.set_current(name, &version)?;
            }
            let dir = self.store.version_dir(name, &version)?;
            return Ok(self
                .store
                .read_manifest(&dir)?
                .unwrap_or_else(|| placeholder_manifest(name, &version)));
        }

        self.store.ensure_repository()?;
        let url = self.catalog.file_url(name, &version);
        let archive = self.store.root().join(format!(
            "{}-{}.zip",
            version::escape(name),
            version::escape(&version)
        ));

        println!(" downloading {} {}", name, version);
        self.http
            .download_resumable(&url, &archive)
            .await
            .with_context(|| format!("Failed to download {} {}", name, version))?;

        println!("  installing {} {}", name, version);
        ArchiveInstaller::new(self.store).install(ArchiveSource::File(&archive), set_current, true)
    }

    /// Install a library from a Git or Mercurial repository.
    ///
    /// The working copy lives in `<library>/<git|hg>` and becomes the current
    /// version. A `subdir` turns into a dev override pointing inside it.
    #[tracing::instrument(skip(self))]
    pub fn install_vcs(
        &mut self,
        kind: VcsKind,
        name: &str,
        url: &str,
        branch: Option<&str>,
        subdir: Option<&str>,
        version: Option<&str>,
    ) -> Result<Manifest> {
        let runtime = self.store.runtime();
        self.store.ensure_repository()?;
        let library_dir = self.store.library_dir(name)?;
        let working_copy = library_dir.join(kind.id());
        let requested = branch.map(String::from);
        let backend = Vcs::new(runtime, kind);

        match self.vcs_branches.get(name) {
            Some(recorded) if *recorded == requested => {
                debug!("{} was already handled in this run", name);
                return self.vcs_manifest(name, &working_copy, subdir);
            }
            _ if runtime.is_dir(&working_copy) => {
                let recorded = self.vcs_branches.get(name).cloned().flatten();
                if recorded != requested {
                    let prompt = format!(
                        "You already have {} version {} installed. Overwrite it with {} {}?",
                        name,
                        kind.id(),
                        url,
                        branch.unwrap_or("(default branch)")
                    );
                    if runtime.confirm(&prompt)? {
                        runtime.remove_dir_all(&working_copy)?;
                        self.clone_into(&backend, &working_copy, url, branch, version)?;
                    } else {
                        println!("    skipped {}", name);
                    }
                } else if backend.update(&working_copy)? {
                    println!("    updated {} ({})", name, kind.id());
                } else {
                    println!(" up to date {} ({})", name, kind.id());
                }
            }
            _ => {
                runtime.create_dir_all(&library_dir)?;
                self.clone_into(&backend, &working_copy, url, branch, version)?;
            }
        }

        self.vcs_branches.insert(name.to_string(), requested);
        self.store.set_current(name, kind.id())?;
        if let Some(subdir) = subdir {
            let dev = working_copy.join(subdir);
            self.store.set_dev(name, &dev.to_string_lossy())?;
        }
        self.vcs_manifest(name, &working_copy, subdir)
    }

    fn clone_into(
        &self,
        backend: &Vcs<'a, R>,
        dest: &Path,
        url: &str,
        branch: Option<&str>,
        version: Option<&str>,
    ) -> Result<()> {
        println!("    cloning {} into {}", url, dest.display());
        if let Err(e) = backend.clone_repo(dest, url, branch, version) {
            let runtime = self.store.runtime();
            if runtime.exists(dest) {
                debug!("Discarding partial clone {:?}", dest);
                runtime.remove_dir_all(dest)?;
            }
            return Err(e);
        }
        Ok(())
    }

    fn vcs_manifest(
        &self,
        name: &str,
        working_copy: &Path,
        subdir: Option<&str>,
    ) -> Result<Manifest> {
        let dir: PathBuf = match subdir {
            Some(s) => working_copy.join(s),
            None => working_copy.to_path_buf(),
        };
        Ok(self
            .store
            .read_manifest(&dir)?
            .unwrap_or_else(|| placeholder_manifest(name, "")))
    }

    /// Install every dependency of a manifest, then theirs, and so on.
    ///
    /// A dependency without a pinned version resolves to the catalog's latest
    /// release, unless an allowed dev override serves it.
    #[tracing::instrument(skip(self, dependencies))]
    pub async fn install_dependencies(
        &mut self,
        dependencies: Vec<DependencySpec>,
        skip: bool,
    ) -> Result<()> {
        if skip {
            debug!("Skipping dependencies");
            return Ok(());
        }

        let mut pending: Vec<DependencySpec> = dependencies.into_iter().rev().collect();
        let mut visited: HashSet<(String, String)> = HashSet::new();

        while let Some(dep) = pending.pop() {
            if !visited.insert((dep.name.clone(), dep.constraint.to_string())) {
                continue;
            }

            let manifest = match &dep.constraint {
                VersionConstraint::Any if self.satisfied_by_dev(&dep.name)? => {
                    debug!("{} is served by its development directory", dep.name);
                    continue;
                }
                VersionConstraint::Any => Some(self.install(&dep.name, None, false).await?),
                VersionConstraint::Exact(version) => {
                    Some(self.install(&dep.name, Some(version), false).await?)
                }
                VersionConstraint::Vcs(kind) => {
                    let url = dep
                        .vcs_url
                        .as_deref()
                        .with_context(|| format!("Missing repository URL for {}", dep.name))?;
                    Some(self.install_vcs(
                        *kind,
                        &dep.name,
                        url,
                        dep.vcs_branch.as_deref(),
                        dep.vcs_subdir.as_deref(),
                        None,
                    )?)
                }
            };

            if let Some(manifest) = manifest {
                let nested = manifest.dependency_specs()?;
                pending.extend(nested.into_iter().rev());
            }
        }
        Ok(())
    }

    fn satisfied_by_dev(&self, name: &str) -> Result<bool> {
        Ok(self
            .store
            .dev_path(name)?
            .is_some_and(|dev| !self.store.is_dev_path_excluded(&dev)))
    }

    /// Bring one library up to date.
    ///
    /// VCS working copies are pulled in place; catalog libraries move to the
    /// latest release, installing it when needed. Returns whether anything changed.
    #[tracing::instrument(skip(self))]
    pub async fn update(&mut self, name: &str, skip_dependencies: bool) -> Result<bool> {
        let library_dir = self.store.library_dir(name)?;
        let runtime = self.store.runtime();

        if let Some((kind, working_copy)) = vcs::detect(runtime, &library_dir) {
            let changed = Vcs::new(runtime, kind).update(&working_copy)?;
            self.vcs_branches.entry(name.to_string()).or_insert(None);
            if changed {
                println!("    updated {} ({})", name, kind.id());
                let dir = self.store.library_path(name, None)?;
                if let Some(manifest) = self.store.read_manifest(&dir)? {
                    self.install_dependencies(manifest.dependency_specs()?, skip_dependencies)
                        .await?;
                }
            }
            return Ok(changed);
        }

        let latest = self.catalog.latest_version(name, false).await?;
        if self.store.current_version(name)?.as_deref() == Some(latest.as_str()) {
            return Ok(false);
        }
        let manifest = self.install(name, Some(&latest), true).await?;
        println!("    updated {} to {}", name, latest);
        self.install_dependencies(manifest.dependency_specs()?, skip_dependencies)
            .await?;
        Ok(true)
    }

    /// Update every installed library. Failures are logged and the sweep goes on.
    ///
    /// Returns the names of the libraries that changed.
    pub async fn update_all(&mut self, skip_dependencies: bool) -> Result<Vec<String>> {
        let mut updated = Vec::new();
        for library in self.store.list_libraries()? {
            let library_dir = self.store.library_dir(&library.name)?;
            if library.dev_path.is_some()
                && vcs::detect(self.store.runtime(), &library_dir).is_none()
            {
                debug!("Skipping {}: development directory in use", library.name);
                continue;
            }
            match self.update(&library.name, skip_dependencies).await {
                Ok(true) => updated.push(library.name),
                Ok(false) => debug!("{} is up to date", library.name),
                Err(e) => warn!("Failed to update {}: {:#}", library.name, e),
            }
        }
        if updated.is_empty() {
            info!("All libraries are up to date");
        }
        Ok(updated)
    }
}

/// Stand-in for packages that ship without a manifest.
fn placeholder_manifest(name: &str, version: &str) -> Manifest {
    Manifest {
        name: name.to_string(),
        version: version.to_string(),
        ..Manifest::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalog;
    use crate::repo::{Provenance, RepositoryLocation};
    use crate::runtime::{ProcessCommand, RealRuntime};
    use crate::test_utils::{TestRuntime, failed_output, ok_output};
    use crate::vcs::VcsError;
    use mockall::predicate::eq;
    use reqwest::Client;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn location(root: &Path) -> RepositoryLocation {
        RepositoryLocation::new(root, Provenance::GlobalConfig)
    }

    fn package_zip(name: &str, version: &str, deps: &[(&str, &str)]) -> Vec<u8> {
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(n, v)| (n.to_string(), serde_json::Value::from(*v)))
            .collect();
        let manifest = serde_json::json!({"name": name, "version": version, "dependencies": deps});
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("haxelib.json", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(manifest.to_string().as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn catalog_for(server_url: String) -> MockCatalog {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_file_url()
            .returning(move |name, version| format!("{}/files/{}-{}.zip", server_url, name, version));
        catalog
    }

    /// Runtime whose git executable clones by creating the destination's `.git`
    /// directory, and reports revision `rev` for `rev-parse`.
    fn git_runtime(cwd: &Path, rev: &'static str, answer: bool) -> TestRuntime {
        TestRuntime::new(cwd).with_answer(answer).with_commands(move |cmd: &ProcessCommand| {
            match cmd.args.first().map(String::as_str) {
                Some("--version") => Ok(ok_output("git version 2.40.0")),
                Some("clone") if cmd.args[2].contains("unreachable") => {
                    fs::create_dir_all(Path::new(&cmd.args[3]).join(".git")).unwrap();
                    Ok(failed_output("fatal: repository not found"))
                }
                Some("clone") => {
                    let dest = Path::new(&cmd.args[3]);
                    fs::create_dir_all(dest.join(".git")).unwrap();
                    fs::create_dir_all(dest.join("lib")).unwrap();
                    fs::write(
                        dest.join("lib/haxelib.json"),
                        r#"{"name": "tool", "version": "0.1.0"}"#,
                    )
                    .unwrap();
                    Ok(ok_output(""))
                }
                Some("rev-parse") => Ok(ok_output(rev)),
                _ => Ok(ok_output("")),
            }
        })
    }

    #[tokio::test]
    async fn test_install_latest_from_catalog() {
        let repo = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/files/foo-1.2.0.zip")
            .with_status(200)
            .with_body(package_zip("foo", "1.2.0", &[]))
            .create_async()
            .await;

        let mut catalog = catalog_for(server.url());
        catalog
            .expect_latest_version()
            .with(eq("foo"), eq(false))
            .returning(|_, _| Ok("1.2.0".to_string()));

        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let manifest = installer.install("foo", None, true).await.unwrap();
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(store.current("foo").unwrap(), "1.2.0");
        assert!(!repo.path().join("foo-1,2,0.zip").exists());

        // second run does not hit the network
        installer.install("foo", Some("1.2.0"), true).await.unwrap();
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_install_rejects_malformed_version_before_network() {
        let repo = tempdir().unwrap();
        let catalog = MockCatalog::new();
        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        for bad in ["../1.0.0", "/tmp/evil", "1.0"] {
            let err = installer.install("foo", Some(bad), true).await.unwrap_err();
            assert!(err.downcast_ref::<version::VersionError>().is_some(), "{}", bad);
        }
        assert!(!repo.path().join("foo").exists());
    }

    #[tokio::test]
    async fn test_install_unset_version_means_latest() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("foo/1,2,0")).unwrap();

        let mut catalog = MockCatalog::new();
        catalog
            .expect_latest_version()
            .with(eq("foo"), eq(false))
            .times(2)
            .returning(|_, _| Ok("1.2.0".to_string()));

        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        installer.install("foo", Some(version::UNSET), true).await.unwrap();
        installer.install("foo", Some(""), true).await.unwrap();
        assert_eq!(store.current("foo").unwrap(), "1.2.0");
    }

    #[tokio::test]
    async fn test_install_dependencies_recurses() {
        let repo = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _bar = server
            .mock("GET", "/files/bar-2.0.0.zip")
            .with_body(package_zip("bar", "2.0.0", &[("baz", "")]))
            .create_async()
            .await;
        let _baz = server
            .mock("GET", "/files/baz-0.3.0.zip")
            .with_body(package_zip("baz", "0.3.0", &[]))
            .create_async()
            .await;

        let mut catalog = catalog_for(server.url());
        catalog
            .expect_latest_version()
            .with(eq("baz"), eq(false))
            .times(1)
            .returning(|_, _| Ok("0.3.0".to_string()));

        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let deps = vec![DependencySpec::exact("bar", "2.0.0"), DependencySpec::any("baz")];
        installer.install_dependencies(deps, false).await.unwrap();

        assert_eq!(store.current("bar").unwrap(), "2.0.0");
        assert_eq!(store.current("baz").unwrap(), "0.3.0");
    }

    #[tokio::test]
    async fn test_installed_dependency_without_version_moves_to_latest() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("foo/1,0,0")).unwrap();
        fs::write(repo.path().join("foo/.current"), "1.0.0").unwrap();

        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/files/foo-2.0.0.zip")
            .with_body(package_zip("foo", "2.0.0", &[]))
            .create_async()
            .await;

        let mut catalog = catalog_for(server.url());
        catalog
            .expect_latest_version()
            .with(eq("foo"), eq(false))
            .times(1)
            .returning(|_, _| Ok("2.0.0".to_string()));

        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        installer
            .install_dependencies(vec![DependencySpec::any("foo")], false)
            .await
            .unwrap();

        download.assert_async().await;
        assert!(store.has_version("foo", "2.0.0"));
        assert_eq!(store.current("foo").unwrap(), "1.0.0");
    }

    #[tokio::test]
    async fn test_install_dependencies_skip_and_dev_override() {
        let repo = tempdir().unwrap();
        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        store.set_dev("local", "/src/local").unwrap();

        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        installer
            .install_dependencies(vec![DependencySpec::any("remote")], true)
            .await
            .unwrap();
        installer
            .install_dependencies(vec![DependencySpec::any("local")], false)
            .await
            .unwrap();
    }

    #[test]
    fn test_vcs_install_sets_current_and_dev() {
        let repo = tempdir().unwrap();
        let runtime = git_runtime(repo.path(), "abc", false);
        let store = PackageStore::new(&runtime, location(repo.path()));
        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let manifest = installer
            .install_vcs(VcsKind::Git, "tool", "https://example.com/tool.git", None, Some("lib"), None)
            .unwrap();

        assert_eq!(manifest.name, "tool");
        let clone = runtime
            .recorded_commands()
            .into_iter()
            .find(|c| c.args.first().map(String::as_str) == Some("clone"))
            .unwrap();
        assert_eq!(&clone.args[..3], ["clone", "--", "https://example.com/tool.git"]);
        assert_eq!(store.current_version("tool").unwrap().as_deref(), Some("git"));
        assert_eq!(
            store.dev_path("tool").unwrap(),
            Some(repo.path().join("tool/git/lib"))
        );
    }

    #[test]
    fn test_vcs_existing_copy_is_updated_in_place() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("tool/git/.git")).unwrap();
        let runtime = git_runtime(repo.path(), "abc", false);
        let store = PackageStore::new(&runtime, location(repo.path()));
        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        installer
            .install_vcs(VcsKind::Git, "tool", "https://example.com/tool.git", None, None, None)
            .unwrap();
        installer
            .install_vcs(VcsKind::Git, "tool", "https://example.com/tool.git", None, None, None)
            .unwrap();

        let commands: Vec<_> = runtime
            .recorded_commands()
            .into_iter()
            .map(|c| c.args.join(" "))
            .collect();
        assert!(commands.contains(&"pull".to_string()));
        assert_eq!(commands.iter().filter(|c| *c == "pull").count(), 1);
        assert!(!commands.iter().any(|c| c.starts_with("clone")));
        assert!(runtime.prompts().is_empty());
    }

    #[test]
    fn test_vcs_branch_change_prompts() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("tool/git/.git")).unwrap();
        fs::write(repo.path().join("tool/git/keep.txt"), "local").unwrap();
        let runtime = git_runtime(repo.path(), "abc", false);
        let store = PackageStore::new(&runtime, location(repo.path()));
        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        installer
            .install_vcs(VcsKind::Git, "tool", "https://example.com/tool.git", Some("dev"), None, None)
            .unwrap();

        assert_eq!(runtime.prompts().len(), 1);
        assert!(repo.path().join("tool/git/keep.txt").exists());
    }

    #[test_log::test]
    fn test_vcs_clone_failure_cleans_up() {
        let repo = tempdir().unwrap();
        let runtime = git_runtime(repo.path(), "abc", false);
        let store = PackageStore::new(&runtime, location(repo.path()));
        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let err = installer
            .install_vcs(VcsKind::Git, "tool", "https://unreachable.invalid/x.git", None, None, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VcsError>(),
            Some(VcsError::CantClone { .. })
        ));
        assert!(!repo.path().join("tool/git").exists());
    }

    #[test]
    fn test_vcs_unavailable_before_network() {
        let repo = tempdir().unwrap();
        let runtime = TestRuntime::new(repo.path());
        let store = PackageStore::new(&runtime, location(repo.path()));
        let catalog = MockCatalog::new();
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let err = installer
            .install_vcs(VcsKind::Mercurial, "tool", "https://unreachable.invalid/x", None, None, None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VcsError>(),
            Some(&VcsError::Unavailable(VcsKind::Mercurial))
        );
        assert!(
            runtime
                .recorded_commands()
                .iter()
                .all(|c| c.args == vec!["--version".to_string()])
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_update_all_continues_after_failure() {
        let repo = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _new = server
            .mock("GET", "/files/good-1.1.0.zip")
            .with_body(package_zip("good", "1.1.0", &[]))
            .create_async()
            .await;

        for (name, version) in [("broken", "1.0.0"), ("good", "1.0.0")] {
            fs::create_dir_all(repo.path().join(name).join(version::escape(version))).unwrap();
            fs::write(repo.path().join(name).join(".current"), version).unwrap();
        }

        let mut catalog = catalog_for(server.url());
        catalog
            .expect_latest_version()
            .with(eq("broken"), eq(false))
            .returning(|name, _| Err(anyhow::anyhow!("No such library: {}", name)));
        catalog
            .expect_latest_version()
            .with(eq("good"), eq(false))
            .returning(|_, _| Ok("1.1.0".to_string()));

        let store = PackageStore::new(&RealRuntime, location(repo.path()));
        let http = HttpClient::new(Client::new());
        let mut installer = Installer::new(&store, &catalog, &http);

        let updated = installer.update_all(false).await.unwrap();
        assert_eq!(updated, vec!["good".to_string()]);
        assert_eq!(store.current("good").unwrap(), "1.1.0");
        assert_eq!(store.current("broken").unwrap(), "1.0.0");
    }
}
