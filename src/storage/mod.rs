//! Blob storage for downloaded PDFs.
//!
//! - [`AzureBlobStore`]: Azure Blob Storage over its REST API
//! - [`LocalBlobStore`]: a directory on the local file system
//! - [`MemoryBlobStore`]: in-process map, for tests and dry runs

mod azure;
mod local;
mod memory;

pub use azure::{AzureBlobStore, ConnectionString};
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ConfigError, Settings};

/// MIME type every stored blob carries
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Errors that can occur while storing a blob
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success status from the storage service
    #[error("Storage service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Network(err.to_string())
    }
}

/// Destination for acquired PDFs
///
/// A single store is shared by every concurrent upload, so implementations
/// must be safe to call from many tasks at once.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Store `bytes` under `name`, replacing any existing blob, and return
    /// the blob's URL.
    async fn upload_pdf(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    /// Called once before the service starts accepting requests
    async fn startup(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Called once after the service stops accepting requests
    async fn shutdown(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Build the configured store: Azure when a connection string is set,
/// otherwise the local output directory.
pub fn store_from_settings(settings: &Settings) -> Result<Arc<dyn BlobStore>, ConfigError> {
    let storage = &settings.storage;

    if let Some(conn) = storage.connection_string.as_deref().filter(|c| !c.trim().is_empty()) {
        let container = storage
            .container_name
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(vec!["STORAGE_CONTAINER_NAME".to_string()]))?;

        let mut parsed = ConnectionString::parse(conn)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if parsed.account_name.is_none() {
            parsed.account_name = storage.account_name.clone();
        }

        let store = AzureBlobStore::new(parsed, container, &settings.http)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        return Ok(Arc::new(store));
    }

    match &storage.output_directory {
        Some(dir) => Ok(Arc::new(LocalBlobStore::new(dir.clone()))),
        None => Err(ConfigError::Missing(vec![
            "AZURE_STORAGE_CONNECTION_STRING or JOURNAL_ARTICLE_DIRECTORY".to_string(),
        ])),
    }
}
