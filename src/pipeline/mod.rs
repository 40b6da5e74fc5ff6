//! Article acquisition pipeline.
//!
//! `search -> filter_open_access -> acquire`, strictly in that order. Each
//! stage either hands a non-empty batch to the next one or fails the run.
//! Per-item failures inside a stage are absorbed by that stage.

pub mod fanout;

pub use fanout::{acquire, AcquireFailure, AcquireOutcome};

use std::sync::Arc;
use tracing::Instrument;

use crate::config::{ConfigError, Settings};
use crate::models::Article;
use crate::sources::{CrossRefClient, DoiPdfResolver, PdfResolver, SourceError, UnpaywallClient};
use crate::storage::BlobStore;

/// Errors that end a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Error fetching DOIs: {0}")]
    MetadataFetch(#[source] SourceError),

    #[error("Error checking for open access: {0}")]
    OpenAccessCheck(#[source] SourceError),

    #[error("No open-access articles found")]
    NoOpenAccess,

    #[error("No articles downloaded")]
    NoDownloads,
}

/// The three acquisition stages wired together
#[derive(Debug, Clone)]
pub struct AcquisitionPipeline {
    crossref: CrossRefClient,
    unpaywall: UnpaywallClient,
    resolver: Arc<dyn PdfResolver>,
    store: Arc<dyn BlobStore>,
}

impl AcquisitionPipeline {
    pub fn new(
        crossref: CrossRefClient,
        unpaywall: UnpaywallClient,
        resolver: Arc<dyn PdfResolver>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            crossref,
            unpaywall,
            resolver,
            store,
        }
    }

    /// Build the pipeline from settings around an existing blob store
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            CrossRefClient::from_settings(settings)?,
            UnpaywallClient::from_settings(settings)?,
            Arc::new(DoiPdfResolver::from_settings(settings)?),
            store,
        ))
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Find, filter, download and store up to `max_results` articles for `query`
    pub async fn run(&self, query: &str, max_results: usize) -> Result<Vec<Article>, PipelineError> {
        let span = tracing::info_span!("acquisition", query = %query, max_results);
        self.run_stages(query, max_results).instrument(span).await
    }

    async fn run_stages(&self, query: &str, max_results: usize) -> Result<Vec<Article>, PipelineError> {
        let found = self
            .crossref
            .search(query, max_results)
            .await
            .map_err(|e| match e {
                SourceError::InvalidRequest(msg) => PipelineError::InvalidRequest(msg),
                other => PipelineError::MetadataFetch(other),
            })?;
        tracing::info!(count = found.len(), "Stage 1: metadata fetched");

        let open = self
            .unpaywall
            .filter_open_access(found)
            .await
            .map_err(|e| match e {
                SourceError::NoOpenAccess => PipelineError::NoOpenAccess,
                other => PipelineError::OpenAccessCheck(other),
            })?;
        tracing::info!(count = open.len(), "Stage 2: open-access subset");

        let acquired = acquire(open, Arc::clone(&self.resolver), Arc::clone(&self.store)).await?;
        tracing::info!(count = acquired.len(), "Stage 3: articles acquired");

        Ok(acquired)
    }
}
