//! Artifact delivery.
//!
//! Transcripts go back to the caller inline; thumbnails are uploaded to
//! remote object storage. Upload failure after a successful conversion is
//! `RelayFailed`, never `ConversionFailed`, so callers know the expensive
//! part does not need to run again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ConvertError;

/// Remote object storage, download-by-key and upload-by-key. URL signing
/// and authorization live outside this crate; implementations talk to a
/// pre-authorized endpoint.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Object store over plain HTTP: GET and PUT against `{base_url}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Prefer the store's structured error message when it sends one.
fn storage_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => response.error.message,
        Err(_) => body.to_string(),
    }
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        info!("Initialized object store at {}", base_url);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.url_for(key);
        debug!("Downloading object {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send download request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "download of {key} failed with status {status}: {}",
                storage_error_message(&body)
            );
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read download body")?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.url_for(key);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .context("Failed to send upload request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "upload of {key} failed with status {status}: {}",
                storage_error_message(&body)
            );
        }

        Ok(())
    }
}

/// Hands a validated artifact to its destination.
pub struct Relay {
    store: Arc<dyn ObjectStore>,
}

impl Relay {
    /// The store handle is built once and shared read-only from here on.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload artifact bytes under a timeout and the caller's cancellation
    /// signal. Any store failure becomes `RelayFailed`.
    pub async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ConvertError> {
        let byte_count = bytes.len();

        tokio::select! {
            result = self.store.upload(key, content_type, bytes) => {
                result.map_err(|e| ConvertError::RelayFailed(e.to_string()))?;
                info!("Uploaded {} bytes to {}", byte_count, key);
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                Err(ConvertError::RelayFailed(format!(
                    "upload of {key} timed out after {timeout:?}"
                )))
            }
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        }
    }
}

/// Canonical storage key for a presentation thumbnail.
pub fn thumbnail_key(user_id: &str, presentation_id: &str) -> String {
    format!("thumbnails/{user_id}/{presentation_id}.png")
}

/// Content type for the artifact extensions this pipeline produces.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
