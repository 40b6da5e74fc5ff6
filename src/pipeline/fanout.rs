//! Download/upload fan-out.
//!
//! One task per article: resolve the PDF on the blocking pool, upload it under
//! the article's file name, record the blob URL. A task that fails for any
//! reason, panics included, drops its article without touching the others.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::models::Article;
use crate::pipeline::PipelineError;
use crate::sources::PdfResolver;
use crate::storage::BlobStore;

/// Why a single article was dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquireFailure {
    #[error("resolver found no PDF")]
    NoPdf,

    #[error("resolver failed: {0}")]
    Resolve(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("task aborted: {0}")]
    Aborted(String),
}

/// Result of one fan-out task
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(Article),
    Dropped { doi: String, reason: AcquireFailure },
}

impl AcquireOutcome {
    pub fn into_article(self) -> Option<Article> {
        match self {
            AcquireOutcome::Acquired(article) => Some(article),
            AcquireOutcome::Dropped { .. } => None,
        }
    }
}

/// Download and upload every article concurrently, keeping the successes.
///
/// File names are assigned to the whole batch before any task starts. Output
/// order follows input order. An empty result is [`PipelineError::NoDownloads`].
pub async fn acquire(
    mut articles: Vec<Article>,
    resolver: Arc<dyn PdfResolver>,
    store: Arc<dyn BlobStore>,
) -> Result<Vec<Article>, PipelineError> {
    for article in &mut articles {
        article.assign_file_name();
    }

    let total = articles.len();
    let dois: Vec<String> = articles.iter().map(|a| a.doi.clone()).collect();

    let handles = articles.into_iter().map(|article| {
        tokio::spawn(acquire_one(
            article,
            Arc::clone(&resolver),
            Arc::clone(&store),
        ))
    });

    let outcomes: Vec<AcquireOutcome> = join_all(handles)
        .await
        .into_iter()
        .zip(dois)
        .map(|(joined, doi)| {
            joined.unwrap_or_else(|e| AcquireOutcome::Dropped {
                doi,
                reason: AcquireFailure::Aborted(e.to_string()),
            })
        })
        .collect();

    let acquired: Vec<Article> = outcomes
        .into_iter()
        .filter_map(|outcome| {
            if let AcquireOutcome::Dropped { doi, reason } = &outcome {
                tracing::warn!(doi = %doi, "Dropping article: {}", reason);
            }
            outcome.into_article()
        })
        .collect();

    tracing::info!(
        attempted = total,
        acquired = acquired.len(),
        "Download fan-out complete"
    );

    if acquired.is_empty() {
        tracing::error!("No articles downloaded.");
        return Err(PipelineError::NoDownloads);
    }
    Ok(acquired)
}

async fn acquire_one(
    mut article: Article,
    resolver: Arc<dyn PdfResolver>,
    store: Arc<dyn BlobStore>,
) -> AcquireOutcome {
    let doi = article.doi.clone();
    let lookup = doi.clone();

    let payload = match tokio::task::spawn_blocking(move || resolver.fetch_pdf(&lookup)).await {
        Ok(Ok(Some(bytes))) if !bytes.is_empty() => bytes,
        Ok(Ok(_)) => return dropped(doi, AcquireFailure::NoPdf),
        Ok(Err(e)) => return dropped(doi, AcquireFailure::Resolve(e.to_string())),
        Err(e) => return dropped(doi, AcquireFailure::Aborted(e.to_string())),
    };

    let file_name = article.assign_file_name().to_string();
    match store.upload_pdf(&file_name, payload).await {
        Ok(url) => {
            tracing::debug!(doi = %doi, file_name = %file_name, "Stored PDF");
            article.blob_url = Some(url);
            AcquireOutcome::Acquired(article)
        }
        Err(e) => dropped(doi, AcquireFailure::Upload(e.to_string())),
    }
}

fn dropped(doi: String, reason: AcquireFailure) -> AcquireOutcome {
    AcquireOutcome::Dropped { doi, reason }
}
