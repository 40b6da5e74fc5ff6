//! Local directory blob store.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::storage::{BlobStore, StorageError};
use crate::utils::sanitize_filename;

/// Writes each blob as a file in one directory and returns its `file://` URL
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    directory: PathBuf,
}

impl LocalBlobStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload_pdf(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let name = sanitize_filename(name).map_err(|e| StorageError::InvalidName(e.to_string()))?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(&name);
        tokio::fs::write(&path, &bytes).await?;

        let absolute = tokio::fs::canonicalize(&path).await?;
        let url = url::Url::from_file_path(&absolute).map_err(|_| {
            StorageError::Config(format!("cannot express {} as a URL", absolute.display()))
        })?;

        tracing::debug!(path = %absolute.display(), bytes = bytes.len(), "Wrote PDF");
        Ok(url.to_string())
    }

    async fn startup(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        tracing::info!(directory = %self.directory.display(), "Local blob store ready");
        Ok(())
    }
}
