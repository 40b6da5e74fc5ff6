//! Clients for the external indexes the acquisition pipeline talks to.
//!
//! - [`CrossRefClient`]: bibliographic metadata search (stage 1)
//! - [`UnpaywallClient`]: open-access status lookups (stage 2)
//! - [`PdfResolver`]: best-effort PDF retrieval for a DOI (stage 3)
//!
//! Upstream JSON is parsed into strict private structs at this boundary; a
//! record missing a required field is an error, never a silently defaulted
//! value.

mod crossref;
pub mod mock;
mod resolver;
mod unpaywall;

pub use crossref::CrossRefClient;
pub use mock::{sample_pdf, MockOutcome, MockResolver};
pub use resolver::{DoiPdfResolver, PdfResolver, ResolveError, PDF_MAGIC};
pub use unpaywall::UnpaywallClient;

/// Errors that can occur when interacting with an index
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Non-success status from the index
    #[error("API error: {0}")]
    Api(String),

    /// No article in the batch is open access
    #[error("No open-access articles found")]
    NoOpenAccess,

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
