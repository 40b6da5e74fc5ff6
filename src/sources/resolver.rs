//! Best-effort PDF resolution for a DOI.
//!
//! Resolution is slow and unreliable by nature (paywalls, dead links, slow
//! hosts), so [`PdfResolver::fetch_pdf`] is a blocking call. Async callers
//! must run it on the blocking pool (`tokio::task::spawn_blocking`).

use scraper::{Html, Selector};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

use crate::config::{ConfigError, ResolverSettings, Settings};
use crate::utils::{encode_doi_path, polite_user_agent, validate_doi, validate_url};

/// Leading bytes of every PDF file
pub const PDF_MAGIC: &[u8] = b"%PDF";

const DOI_RESOLVER_BASE: &str = "https://doi.org";

const MAX_REDIRECTS: usize = 10;

/// Errors raised while resolving a PDF
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// Candidates were found but none produced a usable PDF
    #[error("All {attempts} PDF candidates failed, last error: {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("Resolver error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::Http(err.to_string())
    }
}

/// Locates and downloads a PDF rendition of a document
pub trait PdfResolver: Send + Sync + std::fmt::Debug {
    /// Fetch the PDF for `doi`. Blocking.
    ///
    /// `Ok(None)` means no rendition could be located.
    fn fetch_pdf(&self, doi: &str) -> Result<Option<Vec<u8>>, ResolveError>;
}

/// Resolver that asks Unpaywall for open-access PDF locations and falls back
/// to the `citation_pdf_url` meta tag of the DOI landing page.
#[derive(Debug, Clone)]
pub struct DoiPdfResolver {
    unpaywall_base: String,
    doi_base: String,
    email: String,
    timeout: Duration,
    max_pdf_bytes: u64,
    allow_private_hosts: bool,
}

impl DoiPdfResolver {
    pub fn new(unpaywall_base: impl Into<String>, email: impl Into<String>) -> Self {
        let defaults = ResolverSettings::default();
        Self {
            unpaywall_base: unpaywall_base.into().trim_end_matches('/').to_string(),
            doi_base: DOI_RESOLVER_BASE.to_string(),
            email: email.into(),
            timeout: Duration::from_secs(defaults.timeout_secs),
            max_pdf_bytes: defaults.max_pdf_bytes,
            allow_private_hosts: defaults.allow_private_hosts,
        }
    }

    /// Create a resolver from application settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let email = settings.contact_email()?;
        let resolver = &settings.resolver;
        Ok(Self::new(settings.unpaywall.base_url.clone(), email)
            .timeout(Duration::from_secs(resolver.timeout_secs))
            .max_pdf_bytes(resolver.max_pdf_bytes)
            .allow_private_hosts(resolver.allow_private_hosts))
    }

    /// Override the DOI landing page resolver (default `https://doi.org`)
    pub fn doi_base(mut self, base: impl Into<String>) -> Self {
        self.doi_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_pdf_bytes(mut self, max: u64) -> Self {
        self.max_pdf_bytes = max;
        self
    }

    /// Accept candidate URLs on loopback or private networks
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    fn client(&self) -> Result<reqwest::blocking::Client, ResolveError> {
        reqwest::blocking::Client::builder()
            .user_agent(polite_user_agent(&self.email))
            .timeout(self.timeout)
            .redirect(redirect_policy(self.allow_private_hosts))
            .build()
            .map_err(|e| ResolveError::Other(format!("Failed to create HTTP client: {}", e)))
    }

    /// PDF URLs Unpaywall knows about, best location first
    fn unpaywall_candidates(
        &self,
        client: &reqwest::blocking::Client,
        doi: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let url = format!(
            "{}/{}?email={}",
            self.unpaywall_base,
            encode_doi_path(doi),
            urlencoding::encode(&self.email)
        );
        let response = client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Http(format!(
                "Unpaywall returned status {}",
                response.status()
            )));
        }
        let body = self.read_capped(response)?;
        let data: OaRecord = serde_json::from_slice(&body)
            .map_err(|e| ResolveError::Http(format!("Invalid Unpaywall record: {}", e)))?;

        let mut urls = Vec::new();
        for location in data.best_oa_location.iter().chain(data.oa_locations.iter()) {
            if let Some(pdf) = &location.url_for_pdf {
                if !urls.contains(pdf) {
                    urls.push(pdf.clone());
                }
            }
        }
        Ok(urls)
    }

    /// Fetch the DOI landing page. Returns the PDF directly when the resolver
    /// redirects straight to one, otherwise the advertised PDF link if any.
    fn landing_page(
        &self,
        client: &reqwest::blocking::Client,
        doi: &str,
    ) -> Result<Landing, ResolveError> {
        let url = format!("{}/{}", self.doi_base, encode_doi_path(doi));
        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/pdf, text/html;q=0.9")
            .send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Http(format!(
                "Landing page returned status {}",
                response.status()
            )));
        }

        let final_url = response.url().clone();
        let body = self.read_capped(response)?;
        if body.starts_with(PDF_MAGIC) {
            return Ok(Landing::Pdf(body));
        }

        let html = String::from_utf8_lossy(&body);
        Ok(match citation_pdf_url(&html) {
            Some(link) => Landing::Link(
                final_url
                    .join(&link)
                    .map(|u| u.to_string())
                    .unwrap_or(link),
            ),
            None => Landing::Nothing,
        })
    }

    fn download(&self, client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>, ResolveError> {
        let url = validate_url(url, self.allow_private_hosts)
            .map_err(|e| ResolveError::Http(e.to_string()))?;

        let response = client.get(url).send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Http(format!("status {}", response.status())));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_pdf_bytes {
                return Err(ResolveError::Http(format!(
                    "PDF of {} bytes exceeds the {} byte limit",
                    len, self.max_pdf_bytes
                )));
            }
        }

        let body = self.read_capped(response)?;
        if !body.starts_with(PDF_MAGIC) {
            return Err(ResolveError::Http("response is not a PDF".to_string()));
        }
        Ok(body)
    }

    /// Read a response body, giving up as soon as it passes `max_pdf_bytes`.
    /// Chunked responses carry no length, so the cap is applied while reading.
    fn read_capped(&self, response: reqwest::blocking::Response) -> Result<Vec<u8>, ResolveError> {
        let mut body = Vec::new();
        response
            .take(self.max_pdf_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| ResolveError::Http(format!("Failed to read response body: {}", e)))?;
        if body.len() as u64 > self.max_pdf_bytes {
            return Err(ResolveError::Http(format!(
                "response body exceeds the {} byte limit",
                self.max_pdf_bytes
            )));
        }
        Ok(body)
    }
}

/// Follow at most [`MAX_REDIRECTS`] hops. Unless private hosts are allowed,
/// every hop is checked with [`validate_url`], so a public URL cannot bounce
/// the resolver onto loopback or a metadata endpoint.
fn redirect_policy(allow_private_hosts: bool) -> reqwest::redirect::Policy {
    if allow_private_hosts {
        return reqwest::redirect::Policy::limited(MAX_REDIRECTS);
    }
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        match validate_url(attempt.url().as_str(), false) {
            Ok(_) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

impl PdfResolver for DoiPdfResolver {
    fn fetch_pdf(&self, doi: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        let doi = validate_doi(doi).map_err(|e| ResolveError::InvalidDoi(e.to_string()))?;
        let client = self.client()?;

        let mut candidates = match self.unpaywall_candidates(&client, &doi) {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!(doi = %doi, "Unpaywall lookup for PDF locations failed: {}", e);
                Vec::new()
            }
        };

        let mut attempts = 0;
        let mut last_error = None;
        let mut tried_landing = false;

        loop {
            for url in candidates.drain(..) {
                attempts += 1;
                match self.download(&client, &url) {
                    Ok(pdf) => {
                        tracing::debug!(doi = %doi, url = %url, bytes = pdf.len(), "Resolved PDF");
                        return Ok(Some(pdf));
                    }
                    Err(e) => {
                        tracing::debug!(doi = %doi, url = %url, "PDF candidate failed: {}", e);
                        last_error = Some(e.to_string());
                    }
                }
            }

            if tried_landing {
                break;
            }
            tried_landing = true;

            match self.landing_page(&client, &doi) {
                Ok(Landing::Pdf(pdf)) => return Ok(Some(pdf)),
                Ok(Landing::Link(url)) => candidates.push(url),
                Ok(Landing::Nothing) => {}
                Err(e) => {
                    tracing::debug!(doi = %doi, "Landing page lookup failed: {}", e);
                    last_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        match last_error {
            Some(last) if attempts > 0 => Err(ResolveError::Exhausted { attempts, last }),
            _ => Ok(None),
        }
    }
}

enum Landing {
    Pdf(Vec<u8>),
    Link(String),
    Nothing,
}

/// The `citation_pdf_url` meta tag publishers embed in landing pages
fn citation_pdf_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="citation_pdf_url"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct OaRecord {
    #[serde(default)]
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    #[serde(default)]
    url_for_pdf: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF";

    fn resolver(server: &Server) -> DoiPdfResolver {
        DoiPdfResolver::new(server.url(), "ops@example.org")
            .doi_base(format!("{}/doi", server.url()))
            .timeout(Duration::from_secs(5))
            .allow_private_hosts(true)
    }

    #[test]
    fn test_citation_pdf_url() {
        let html = r#"<html><head>
            <meta name="citation_title" content="Agents">
            <meta name="citation_pdf_url" content="https://example.org/agents.pdf">
        </head><body></body></html>"#;
        assert_eq!(
            citation_pdf_url(html).as_deref(),
            Some("https://example.org/agents.pdf")
        );
        assert!(citation_pdf_url("<html></html>").is_none());
    }

    #[test]
    fn test_fetch_from_unpaywall_location() {
        let mut server = Server::new();
        let pdf_url = format!("{}/files/agents.pdf", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"is_oa": true, "best_oa_location": {{"url_for_pdf": "{}"}}, "oa_locations": []}}"#,
                pdf_url
            ))
            .create();
        let _pdf = server
            .mock("GET", "/files/agents.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF)
            .create();

        let pdf = resolver(&server).fetch_pdf("10.1000/agents").unwrap();
        assert_eq!(pdf.as_deref(), Some(PDF));
    }

    #[test]
    fn test_falls_back_to_landing_page_link() {
        let mut server = Server::new();
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<html><head><meta name="citation_pdf_url" content="/files/landing.pdf"></head></html>"#)
            .create();
        let _pdf = server
            .mock("GET", "/files/landing.pdf")
            .with_status(200)
            .with_body(PDF)
            .create();

        let pdf = resolver(&server).fetch_pdf("10.1000/agents").unwrap();
        assert_eq!(pdf.as_deref(), Some(PDF));
    }

    #[test]
    fn test_non_pdf_payload_is_rejected() {
        let mut server = Server::new();
        let html_url = format!("{}/files/paywall.html", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"best_oa_location": {{"url_for_pdf": "{}"}}}}"#,
                html_url
            ))
            .create();
        let _html = server
            .mock("GET", "/files/paywall.html")
            .with_status(200)
            .with_body("<html>Please log in</html>")
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(200)
            .with_body("<html></html>")
            .create();

        let err = resolver(&server).fetch_pdf("10.1000/agents").unwrap_err();
        assert!(matches!(err, ResolveError::Exhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_nothing_found_is_none() {
        let mut server = Server::new();
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"is_oa": false, "best_oa_location": null, "oa_locations": []}"#)
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(200)
            .with_body("<html><head></head></html>")
            .create();

        assert!(resolver(&server).fetch_pdf("10.1000/agents").unwrap().is_none());
    }

    #[test]
    fn test_private_candidates_rejected_by_default() {
        let mut server = Server::new();
        let pdf_url = format!("{}/files/agents.pdf", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"best_oa_location": {{"url_for_pdf": "{}"}}}}"#, pdf_url))
            .create();
        let pdf = server
            .mock("GET", "/files/agents.pdf")
            .with_body(PDF)
            .expect(0)
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(404)
            .create();

        let result = resolver(&server)
            .allow_private_hosts(false)
            .fetch_pdf("10.1000/agents");
        assert!(result.is_err());
        pdf.assert();
    }

    #[test]
    fn test_oversized_pdf_rejected() {
        let mut server = Server::new();
        let pdf_url = format!("{}/files/big.pdf", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/big")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"best_oa_location": {{"url_for_pdf": "{}"}}}}"#, pdf_url))
            .create();
        let _pdf = server
            .mock("GET", "/files/big.pdf")
            .with_status(200)
            .with_body(PDF)
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/big")
            .with_status(404)
            .create();

        let result = resolver(&server).max_pdf_bytes(8).fetch_pdf("10.1000/big");
        assert!(matches!(result, Err(ResolveError::Exhausted { .. })));
    }

    #[test]
    fn test_doi_with_fragment_character_is_encoded() {
        let mut server = Server::new();
        let truncated_lookup = server
            .mock("GET", "/10.1000/a")
            .match_query(Matcher::Any)
            .expect(0)
            .create();
        let truncated_landing = server.mock("GET", "/doi/10.1000/a").expect(0).create();
        let lookup = server
            .mock("GET", "/10.1000/a%23b")
            .match_query(Matcher::UrlEncoded("email".into(), "ops@example.org".into()))
            .with_status(404)
            .create();
        let landing = server
            .mock("GET", "/doi/10.1000/a%23b")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF)
            .create();

        let pdf = resolver(&server).fetch_pdf("10.1000/a#b").unwrap();
        assert_eq!(pdf.as_deref(), Some(PDF));
        lookup.assert();
        landing.assert();
        truncated_lookup.assert();
        truncated_landing.assert();
    }

    #[test]
    fn test_chunked_body_over_cap_is_cut_off() {
        let mut server = Server::new();
        let pdf_url = format!("{}/files/endless.pdf", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/endless")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"best_oa_location": {{"url_for_pdf": "{}"}}}}"#, pdf_url))
            .create();
        let _pdf = server
            .mock("GET", "/files/endless.pdf")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"%PDF-1.7\n")?;
                let chunk = [b'0'; 64 * 1024];
                for _ in 0..64 {
                    w.write_all(&chunk)?;
                }
                Ok(())
            })
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/endless")
            .with_status(404)
            .create();

        let err = resolver(&server)
            .max_pdf_bytes(1024)
            .fetch_pdf("10.1000/endless")
            .unwrap_err();
        match err {
            ResolveError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert!(last.contains("response body exceeds the 1024 byte limit"), "{}", last);
            }
            other => panic!("expected exhausted candidates, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_landing_page_is_not_parsed() {
        let mut server = Server::new();
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();
        let padding = "<p>filler</p>".repeat(1024);
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(format!(
                r#"<html><body>{}<meta name="citation_pdf_url" content="/files/late.pdf"></body></html>"#,
                padding
            ))
            .create();
        let late_pdf = server
            .mock("GET", "/files/late.pdf")
            .with_body(PDF)
            .expect(0)
            .create();

        let pdf = resolver(&server)
            .max_pdf_bytes(1024)
            .fetch_pdf("10.1000/agents")
            .unwrap();
        assert!(pdf.is_none());
        late_pdf.assert();
    }

    #[test]
    fn test_redirect_to_private_host_is_not_followed() {
        let mut server = Server::new();
        let internal = format!("{}/internal/credentials", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();
        let landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(302)
            .with_header("location", &internal)
            .create();
        let target = server
            .mock("GET", "/internal/credentials")
            .with_body(PDF)
            .expect(0)
            .create();

        let pdf = resolver(&server)
            .allow_private_hosts(false)
            .fetch_pdf("10.1000/agents")
            .unwrap();
        assert!(pdf.is_none());
        landing.assert();
        target.assert();
    }

    #[test]
    fn test_redirects_followed_when_private_hosts_allowed() {
        let mut server = Server::new();
        let moved = format!("{}/files/moved.pdf", server.url());
        let _lookup = server
            .mock("GET", "/10.1000/agents")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();
        let _landing = server
            .mock("GET", "/doi/10.1000/agents")
            .with_status(302)
            .with_header("location", &moved)
            .create();
        let _pdf = server
            .mock("GET", "/files/moved.pdf")
            .with_status(200)
            .with_body(PDF)
            .create();

        let pdf = resolver(&server).fetch_pdf("10.1000/agents").unwrap();
        assert_eq!(pdf.as_deref(), Some(PDF));
    }

    #[test]
    fn test_invalid_doi() {
        let server = Server::new();
        assert!(matches!(
            resolver(&server).fetch_pdf("nonsense"),
            Err(ResolveError::InvalidDoi(_))
        ));
    }
}
