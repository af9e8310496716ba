//! Catalog served over HTTP JSON.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::http::{HttpClient, NonRetryableError};
use crate::version;

use super::{Catalog, CatalogError, LibraryInfo};

/// Catalog backed by a remote server.
///
/// - Metadata: `GET {remote}/api/library/{name}`
/// - Archives: `{remote}/files/3.0/{escaped-name}-{escaped-version}.zip`
pub struct HttpCatalog {
    http_client: HttpClient,
    remote: String,
}

impl HttpCatalog {
    pub fn new(http_client: HttpClient, remote: &str) -> Self {
        Self {
            http_client,
            remote: remote.trim_end_matches('/').to_string(),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn library_info(&self, name: &str) -> Result<LibraryInfo> {
        let url = format!("{}/api/library/{}", self.remote, name);
        debug!("Fetching library info from {}...", url);
        match self.http_client.get_json(&url).await {
            Err(e)
                if matches!(
                    e.downcast_ref::<NonRetryableError>(),
                    Some(NonRetryableError::NotFound(_))
                ) =>
            {
                Err(CatalogError::UnknownLibrary(name.to_string()).into())
            }
            other => other,
        }
    }

    async fn latest_version(&self, name: &str, include_pre: bool) -> Result<String> {
        let info = self.library_info(name).await?;
        Ok(info.latest_version(include_pre)?)
    }

    fn file_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/files/3.0/{}-{}.zip",
            self.remote,
            version::escape(name),
            version::escape(version)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    fn catalog(remote: &str) -> HttpCatalog {
        HttpCatalog::new(HttpClient::new(Client::new()), remote)
    }

    #[test]
    fn test_file_url() {
        let catalog = catalog("https://lib.example.org/");
        assert_eq!(
            catalog.file_url("my.lib", "1.2.0-rc.1"),
            "https://lib.example.org/files/3.0/my,lib-1,2,0-rc,1.zip"
        );
    }

    #[tokio::test]
    async fn test_latest_version_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/library/foo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name": "foo", "curversion": "1.2.0",
                    "versions": [{"name": "1.0.0"}, {"name": "1.2.0"}, {"name": "2.0.0-rc.1"}]}"#,
            )
            .create_async()
            .await;

        let catalog = catalog(&server.url());
        assert_eq!(catalog.latest_version("foo", false).await.unwrap(), "1.2.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_library() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/library/nope")
            .with_status(404)
            .create_async()
            .await;

        let err = catalog(&server.url()).library_info("nope").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::UnknownLibrary("nope".into()))
        );
    }
}
