//! Utility modules shared by the pipeline stages.
//!
//! - [`HttpClient`]: reqwest client with the service's timeout defaults
//! - [`polite_user_agent`]: user agent naming the operator contact email
//! - [`validate_url`]: reject non-http(s) and private-network URLs before fetching them
//! - [`validate_doi`]: normalize a DOI for use in request paths
//! - [`encode_doi_path`]: percent-encode a DOI as URL path segments
//! - [`sanitize_filename`]: guard blob names used as path components

mod http;
mod validate;

pub use http::{polite_user_agent, HttpClient, DEFAULT_USER_AGENT};
pub use validate::{encode_doi_path, sanitize_filename, validate_doi, validate_url, ValidationError};
