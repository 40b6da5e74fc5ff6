//! HTTP client utilities.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HttpSettings;
use crate::sources::SourceError;

/// Default user agent, `research-agent/<version>`
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP client with the service's timeout defaults
///
/// Cheap to clone. Each pipeline stage builds its own so connection pools are
/// never shared between stages.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(user_agent: &str) -> Result<Self, SourceError> {
        Self::with_settings(user_agent, &HttpSettings::default())
    }

    /// Create a new HTTP client with a custom user agent and timeouts
    pub fn with_settings(user_agent: &str, settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    /// Start a POST request
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Start a PUT request
    pub fn put(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.put(url)
    }
}

/// User agent for the bibliographic indexes, naming the operator contact
/// as their etiquette policies ask.
pub fn polite_user_agent(email: &str) -> String {
    format!("{} (mailto:{})", DEFAULT_USER_AGENT, email)
}
