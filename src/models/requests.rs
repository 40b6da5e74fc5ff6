//! Request and response payloads of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of metadata records requested per search
pub const DEFAULT_MAX_ARTICLES: usize = 10;

/// Upper bound accepted by the metadata index for one page
pub const MAX_ARTICLES_LIMIT: usize = 1000;

/// Body of `POST /search_download_articles/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDownloadRequest {
    /// Free-text search phrase
    pub query: String,

    /// Page size requested from the metadata index
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

fn default_max_articles() -> usize {
    DEFAULT_MAX_ARTICLES
}

impl SearchDownloadRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_articles: DEFAULT_MAX_ARTICLES,
        }
    }

    pub fn max_articles(mut self, max: usize) -> Self {
        self.max_articles = max;
        self
    }

    /// Check the request before any upstream call is made
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.max_articles == 0 || self.max_articles > MAX_ARTICLES_LIMIT {
            return Err(format!(
                "max_articles must be between 1 and {}",
                MAX_ARTICLES_LIMIT
            ));
        }
        Ok(())
    }
}

/// Body of `POST /chat/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system_message: String,
    pub user_message: String,
}

/// Reply of `POST /chat/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub response: String,
}

impl ChatResponse {
    /// Wrap a completion with a fresh request id and the current time
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            response: response.into(),
        }
    }
}
