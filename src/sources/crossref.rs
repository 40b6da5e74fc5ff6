//! CrossRef metadata client.
//!
//! Searches the works index and maps each item into an [`Article`]. The call
//! is all-or-nothing: a bad status, a transport failure or a single malformed
//! item fails the whole search.

use serde::Deserialize;

use crate::config::{ConfigError, HttpSettings, Settings};
use crate::models::{Article, Author};
use crate::sources::SourceError;
use crate::utils::{polite_user_agent, HttpClient};

/// CrossRef works search client
#[derive(Debug, Clone)]
pub struct CrossRefClient {
    base_url: String,
    filter: String,
    user_agent: String,
    http: HttpSettings,
}

impl CrossRefClient {
    /// Create a client for the works endpoint at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        filter: impl Into<String>,
        contact_email: &str,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            filter: filter.into(),
            user_agent: polite_user_agent(contact_email),
            http: HttpSettings::default(),
        }
    }

    /// Create a client from application settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let email = settings.contact_email()?;
        Ok(Self::new(
            settings.crossref.base_url.clone(),
            settings.crossref.filter.clone(),
            email,
        )
        .http_settings(settings.http.clone()))
    }

    /// Override the timeouts used for each search
    pub fn http_settings(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// Search the index for up to `max_results` records matching `query`
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        if query.trim().is_empty() {
            return Err(SourceError::InvalidRequest("query must not be empty".to_string()));
        }
        if max_results == 0 {
            return Err(SourceError::InvalidRequest(
                "max_results must be positive".to_string(),
            ));
        }

        let result = self.fetch(query, max_results).await;
        match &result {
            Ok(articles) => tracing::info!(
                query = %query,
                count = articles.len(),
                "Fetched metadata records from CrossRef"
            ),
            Err(e) => tracing::warn!(query = %query, "Error fetching DOIs: {}", e),
        }
        result
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<Article>, SourceError> {
        let client = HttpClient::with_settings(&self.user_agent, &self.http)?;
        let rows = max_results.to_string();

        let response = client
            .get(&self.base_url)
            .query(&[
                ("query", query),
                ("filter", self.filter.as_str()),
                ("rows", rows.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to search CrossRef: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "CrossRef API returned status: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(format!("Failed to read CrossRef response: {}", e)))?;

        parse_works(&body)
    }
}

/// Parse a works search response body into articles
fn parse_works(body: &str) -> Result<Vec<Article>, SourceError> {
    let data: CRResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("Failed to parse CrossRef response: {}", e)))?;

    data.message
        .items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let item: CRItem = serde_json::from_value(raw).map_err(|e| {
                SourceError::Parse(format!("CrossRef item {} is malformed: {}", index, e))
            })?;
            item.into_article()
                .map_err(|reason| SourceError::Parse(format!("CrossRef item {}: {}", index, reason)))
        })
        .collect()
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRMessage,
}

#[derive(Debug, Deserialize)]
struct CRMessage {
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: String,
    title: Vec<String>,
    author: Vec<Author>,
    published: CRDate,
    #[serde(rename = "URL")]
    url: String,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts")]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRItem {
    fn into_article(self) -> Result<Article, String> {
        if self.doi.trim().is_empty() {
            return Err("empty DOI".to_string());
        }
        // the first entry is the canonical title
        if self.title.first().map_or(true, |t| t.trim().is_empty()) {
            return Err(format!("DOI {} has no title", self.doi));
        }
        let year = self
            .published
            .date_parts
            .first()
            .and_then(|parts| parts.first())
            .copied()
            .flatten()
            .ok_or_else(|| format!("DOI {} has no publication year", self.doi))?;

        Ok(Article {
            doi: self.doi,
            title: self.title,
            author: self.author,
            year_published: year,
            url: self.url,
            r#abstract: self.abstract_text,
            file_name: None,
            blob_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const TWO_WORKS: &str = r#"{
        "status": "ok",
        "message": {
            "total-results": 2,
            "items": [
                {
                    "DOI": "10.1000/agents.1",
                    "title": ["Multi-Agent Workflows: A Survey"],
                    "author": [
                        {"given": "Ada", "family": "Lovelace", "sequence": "first",
                         "affiliation": [{"name": "Analytical Engines Ltd"}]}
                    ],
                    "published": {"date-parts": [[2024, 3, 1]]},
                    "URL": "https://doi.org/10.1000/agents.1",
                    "abstract": "<jats:p>Agents.</jats:p>"
                },
                {
                    "DOI": "10.1000/agents.2",
                    "title": ["Coordinating LLM Agents", "Coordinating Agents"],
                    "author": [],
                    "published": {"date-parts": [[2023]]},
                    "URL": "https://doi.org/10.1000/agents.2"
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_works() {
        let articles = parse_works(TWO_WORKS).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.doi, "10.1000/agents.1");
        assert_eq!(first.canonical_title(), "Multi-Agent Workflows: A Survey");
        assert_eq!(first.year_published, 2024);
        assert_eq!(first.author[0].family.as_deref(), Some("Lovelace"));
        assert!(first.author[0].extra.contains_key("affiliation"));
        assert_eq!(first.r#abstract.as_deref(), Some("<jats:p>Agents.</jats:p>"));
        assert!(first.file_name.is_none());

        let second = &articles[1];
        assert_eq!(second.title.len(), 2);
        assert_eq!(second.year_published, 2023);
        assert!(second.r#abstract.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_url() {
        let body = r#"{"message": {"items": [
            {"DOI": "10.1/x", "title": ["T"], "author": [], "published": {"date-parts": [[2020]]}}
        ]}}"#;
        let err = parse_works(body).unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref msg) if msg.contains("URL")));
    }

    #[test]
    fn test_parse_rejects_null_year() {
        let body = r#"{"message": {"items": [
            {"DOI": "10.1/x", "title": ["T"], "author": [],
             "published": {"date-parts": [[null]]}, "URL": "https://doi.org/10.1/x"}
        ]}}"#;
        assert!(matches!(parse_works(body), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_empty_title() {
        let body = r#"{"message": {"items": [
            {"DOI": "10.1/x", "title": [], "author": [],
             "published": {"date-parts": [[2020]]}, "URL": "https://doi.org/10.1/x"}
        ]}}"#;
        assert!(matches!(parse_works(body), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_blank_first_title() {
        let body = r#"{"message": {"items": [
            {"DOI": "10.1/x", "title": ["  ", "Variant Title"], "author": [],
             "published": {"date-parts": [[2020]]}, "URL": "https://doi.org/10.1/x"}
        ]}}"#;
        assert!(matches!(parse_works(body), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_parse_empty_item_list() {
        let body = r#"{"message": {"items": []}}"#;
        assert!(parse_works(body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_sends_expected_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "multi-agent workflows".into()),
                Matcher::UrlEncoded("rows".into(), "2".into()),
                Matcher::UrlEncoded("filter".into(), "type:journal-article".into()),
            ]))
            .match_header("user-agent", Matcher::Regex("mailto:ops@example.org".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TWO_WORKS)
            .create_async()
            .await;

        let client = CrossRefClient::new(
            format!("{}/works", server.url()),
            "type:journal-article",
            "ops@example.org",
        );
        let articles = client.search("multi-agent workflows", 2).await.unwrap();

        assert_eq!(articles.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_error_status_fails_whole_call() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = CrossRefClient::new(
            format!("{}/works", server.url()),
            "type:journal-article",
            "ops@example.org",
        );
        let err = client.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, SourceError::Api(_)));
    }

    #[tokio::test]
    async fn test_search_validates_before_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = CrossRefClient::new(server.url(), "type:journal-article", "ops@example.org");
        assert!(matches!(
            client.search("  ", 5).await,
            Err(SourceError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.search("agents", 0).await,
            Err(SourceError::InvalidRequest(_))
        ));
        mock.assert_async().await;
    }
}
