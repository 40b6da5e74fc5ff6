//! Unpaywall open-access checker.
//!
//! Uses the Unpaywall API to decide which DOIs are freely downloadable.
//! API documentation: <https://unpaywall.org/products/api>

use futures_util::future::join_all;
use serde::Deserialize;

use crate::config::{ConfigError, HttpSettings, Settings};
use crate::models::Article;
use crate::sources::SourceError;
use crate::utils::{encode_doi_path, polite_user_agent, validate_doi, HttpClient};

/// Unpaywall lookup client
///
/// The API requires an email address (free, no key needed).
#[derive(Debug, Clone)]
pub struct UnpaywallClient {
    base_url: String,
    email: String,
    http: HttpSettings,
}

impl UnpaywallClient {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            http: HttpSettings::default(),
        }
    }

    /// Create a client from application settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let email = settings.contact_email()?;
        Ok(Self::new(settings.unpaywall.base_url.clone(), email).http_settings(settings.http.clone()))
    }

    /// Override the timeouts used for each lookup
    pub fn http_settings(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// Lookup URL for a DOI, `{base}/{doi}?email={email}`
    pub fn lookup_url(&self, doi: &str) -> Result<String, SourceError> {
        let doi = validate_doi(doi).map_err(|e| SourceError::InvalidRequest(e.to_string()))?;
        Ok(format!(
            "{}/{}?email={}",
            self.base_url,
            encode_doi_path(&doi),
            urlencoding::encode(&self.email)
        ))
    }

    /// Keep the open-access subset of `articles`.
    ///
    /// Every lookup is launched at once and joined. A failed or unreadable
    /// lookup counts as "not open access" and never affects its siblings.
    /// An empty subset is an error.
    pub async fn filter_open_access(&self, articles: Vec<Article>) -> Result<Vec<Article>, SourceError> {
        let client = HttpClient::with_settings(&polite_user_agent(&self.email), &self.http)?;
        let total = articles.len();

        let flags = join_all(
            articles
                .iter()
                .map(|article| self.is_open_access(&client, &article.doi)),
        )
        .await;

        let open: Vec<Article> = articles
            .into_iter()
            .zip(flags)
            .filter_map(|(article, is_oa)| is_oa.then_some(article))
            .collect();

        tracing::info!(
            checked = total,
            open_access = open.len(),
            "Open-access check complete"
        );

        if open.is_empty() {
            tracing::error!("No open-access articles found.");
            return Err(SourceError::NoOpenAccess);
        }
        Ok(open)
    }

    async fn is_open_access(&self, client: &HttpClient, doi: &str) -> bool {
        match self.lookup(client, doi).await {
            Ok(is_oa) => {
                tracing::debug!(doi = %doi, is_oa, "Unpaywall lookup");
                is_oa
            }
            Err(e) => {
                tracing::warn!(doi = %doi, "Error checking for open access: {}", e);
                false
            }
        }
    }

    async fn lookup(&self, client: &HttpClient, doi: &str) -> Result<bool, SourceError> {
        let url = self.lookup_url(doi)?;

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to lookup DOI in Unpaywall: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "Unpaywall API returned status {}",
                response.status()
            )));
        }

        let data: UnpaywallResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse Unpaywall response: {}", e)))?;

        Ok(data.is_oa.unwrap_or(false))
    }
}

/// Unpaywall API response; only the flag matters here
#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleBuilder;
    use mockito::{Matcher, Server};

    fn article(doi: &str) -> Article {
        ArticleBuilder::new(doi, format!("Title {}", doi)).year(2024).build()
    }

    #[test]
    fn test_lookup_url() {
        let client = UnpaywallClient::new("https://api.unpaywall.org/v2/", "ops@example.org");
        assert_eq!(
            client.lookup_url("10.1000/Agents.1").unwrap(),
            "https://api.unpaywall.org/v2/10.1000/agents.1?email=ops%40example.org"
        );
        assert!(client.lookup_url("not-a-doi").is_err());
    }

    #[tokio::test]
    async fn test_filter_keeps_open_subset() {
        let mut server = Server::new_async().await;
        let _open = server
            .mock("GET", "/10.1000/a")
            .match_query(Matcher::UrlEncoded("email".into(), "ops@example.org".into()))
            .with_status(200)
            .with_body(r#"{"doi": "10.1000/a", "is_oa": true}"#)
            .create_async()
            .await;
        let _closed = server
            .mock("GET", "/10.1000/b")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"doi": "10.1000/b", "is_oa": false}"#)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/10.1000/c")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let _garbled = server
            .mock("GET", "/10.1000/d")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"doi": "10.1000/d", "is_oa": "maybe"}"#)
            .create_async()
            .await;

        let client = UnpaywallClient::new(server.url(), "ops@example.org");
        let input = vec![
            article("10.1000/a"),
            article("10.1000/b"),
            article("10.1000/c"),
            article("10.1000/d"),
        ];
        let open = client.filter_open_access(input).await.unwrap();

        assert_eq!(open.len(), 1);
        assert_eq!(open[0].doi, "10.1000/a");
    }

    #[tokio::test]
    async fn test_filter_fails_when_nothing_is_open() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(r"^/10\.1000/".into()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"is_oa": false}"#)
            .expect(2)
            .create_async()
            .await;

        let client = UnpaywallClient::new(server.url(), "ops@example.org");
        let result = client
            .filter_open_access(vec![article("10.1000/x"), article("10.1000/y")])
            .await;

        assert!(matches!(result, Err(SourceError::NoOpenAccess)));
    }

    #[tokio::test]
    async fn test_filter_empty_input_is_an_error() {
        let client = UnpaywallClient::new("http://127.0.0.1:9", "ops@example.org");
        let result = client.filter_open_access(Vec::new()).await;
        assert!(matches!(result, Err(SourceError::NoOpenAccess)));
    }

    #[tokio::test]
    async fn test_missing_flag_counts_as_closed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/10.1000/a")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"doi": "10.1000/a"}"#)
            .create_async()
            .await;

        let client = UnpaywallClient::new(server.url(), "ops@example.org");
        let result = client.filter_open_access(vec![article("10.1000/a")]).await;
        assert!(matches!(result, Err(SourceError::NoOpenAccess)));
    }
}
