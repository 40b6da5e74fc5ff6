//! In-memory blob store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::storage::{BlobStore, StorageError};

/// Keeps uploaded blobs in a map, keyed by name
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_names: Vec<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads under `name` fail
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.fail_names.push(name.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored blob names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upload_pdf(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        if self.fail_names.iter().any(|n| n == name) {
            return Err(StorageError::Api {
                status: 500,
                message: format!("upload of {} refused", name),
            });
        }
        self.lock().insert(name.to_string(), bytes);
        Ok(format!("memory://blobs/{}", name))
    }
}
