//! HTTP client with bounded retry and resumable downloads.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::retry::{MAX_RETRIES, RETRY_DELAY_MS, classify_status, is_retryable};

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?;

            let response = response.error_for_status().map_err(classify_status)?;

            let result = response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")?;

            Ok(result)
        })
        .await
    }

    /// Download `url` into `dest`, resuming a partial file left by an earlier attempt.
    ///
    /// An existing file is continued with a range request; a 416 reply means
    /// it is already complete. A server that ignores the range gets the file
    /// rewritten from the start. Returns the final file size.
    #[tracing::instrument(skip(self))]
    pub async fn download_resumable(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("Downloading {} to {:?}...", url, dest);
        self.with_retry("Download", || self.download_once(url, dest))
            .await
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let offset = match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };

        let mut request = self.client.get(url);
        if offset > 0 {
            debug!("Resuming download at byte {}", offset);
            request = request.header(RANGE, format!("bytes={}-", offset));
        }
        let response = request
            .send()
            .await
            .context("Failed to start download request")?;

        if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!("{:?} is already complete", dest);
            return Ok(offset);
        }
        let mut response = response.error_for_status().map_err(classify_status)?;

        let resumed = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(dest)
            .await
            .with_context(|| format!("Failed to open {:?} for writing", dest))?;

        let mut size = if resumed { offset } else { 0 };
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            file.write_all(&chunk)
                .await
                .context("Failed to write chunk to file")?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {:.2} MB", size as f64 / (1024.0 * 1024.0));
        Ok(size)
    }

    /// Executes an async operation, retrying timeouts.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    warn!(
                        "{}: attempt {}/{} timed out, retrying in {}ms...",
                        operation_name, attempt, MAX_RETRIES, RETRY_DELAY_MS
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("{}: giving up after {} attempt(s): {}", operation_name, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
