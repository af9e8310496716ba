use anyhow::Result;
use std::path::Path;

use crate::{
    catalog::Catalog,
    package::PackageError,
    resolve::Installer,
    runtime::{Runtime, normalize_path},
};

use super::config::Config;

/// Make `version` the current version of a library, offering to install it when missing.
#[tracing::instrument(skip(config))]
pub async fn set<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    name: &str,
    version: &str,
) -> Result<()> {
    let store = config.store()?;

    if !store.has_version(name, version) {
        let prompt = format!(
            "Library {} version {} is not installed. Install it?",
            name, version
        );
        if !config.runtime.confirm(&prompt)? {
            return Err(PackageError::VersionNotInstalled {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }
        let mut installer = Installer::new(&store, &config.catalog, &config.http);
        let manifest = installer.install(name, Some(version), true).await?;
        installer
            .install_dependencies(manifest.dependency_specs()?, config.options.skip_dependencies)
            .await?;
    } else {
        store.set_current(name, version)?;
    }

    println!("Library {} current version is now {}", name, version);
    Ok(())
}

/// Point a library at a development directory, or clear it when `path` is `None`.
///
/// Relative paths are taken from the working directory. Paths carrying
/// `%VAR%` references are stored untouched and expanded on use.
#[tracing::instrument(skip(config))]
pub fn dev<R: Runtime, C: Catalog>(
    config: &Config<R, C>,
    name: &str,
    path: Option<&str>,
) -> Result<()> {
    let store = config.store()?;

    match path {
        Some(path) => {
            let stored = if path.contains('%') || Path::new(path).is_absolute() {
                path.to_string()
            } else {
                normalize_path(&config.runtime.current_dir()?.join(path))
                    .to_string_lossy()
                    .into_owned()
            };
            store.set_dev(name, &stored)?;
            println!("Development directory of {} set to {}", name, stored);
        }
        None => {
            store.clear_dev(name)?;
            println!("Development directory of {} disabled", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalog;
    use crate::commands::Options;
    use crate::http::HttpClient;
    use crate::test_utils::TestRuntime;
    use reqwest::Client;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn config(repo: &TempDir, cwd: &Path, answer: bool) -> Config<TestRuntime, MockCatalog> {
        Config {
            runtime: TestRuntime::new(cwd)
                .with_env("HAXELIB_PATH", &repo.path().to_string_lossy())
                .with_answer(answer),
            catalog: MockCatalog::new(),
            http: HttpClient::new(Client::new()),
            options: Options::default(),
        }
    }

    #[tokio::test]
    async fn test_set_installed_version() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("foo/1,0,0")).unwrap();
        fs::create_dir_all(repo.path().join("foo/2,0,0")).unwrap();
        fs::write(repo.path().join("foo/.current"), "1.0.0").unwrap();

        let config = config(&repo, repo.path(), false);
        set(&config, "foo", "2.0.0").await.unwrap();
        assert_eq!(fs::read_to_string(repo.path().join("foo/.current")).unwrap(), "2.0.0");
        assert!(config.runtime.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_set_missing_version_declined() {
        let repo = tempdir().unwrap();
        fs::create_dir_all(repo.path().join("foo/1,0,0")).unwrap();

        let config = config(&repo, repo.path(), false);
        let err = set(&config, "foo", "3.0.0").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::VersionNotInstalled { .. })
        ));
        assert_eq!(config.runtime.prompts().len(), 1);
    }

    #[test]
    fn test_dev_relative_path_is_absolutized() {
        let repo = tempdir().unwrap();
        let work = tempdir().unwrap();
        let config = config(&repo, work.path(), false);

        dev(&config, "foo", Some("./src/../lib")).unwrap();
        assert_eq!(
            fs::read_to_string(repo.path().join("foo/.dev")).unwrap(),
            work.path().join("lib").to_string_lossy()
        );

        dev(&config, "foo", Some("%HOME%/foo")).unwrap();
        assert_eq!(fs::read_to_string(repo.path().join("foo/.dev")).unwrap(), "%HOME%/foo");

        dev(&config, "foo", None).unwrap();
        assert!(!repo.path().join("foo/.dev").exists());
    }
}
