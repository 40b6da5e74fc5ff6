//! Input validation for DOIs, third-party URLs and blob names.
//!
//! URLs handed to us by upstream indexes are fetched server-side, so they are
//! checked against loopback and private ranges before use.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Invalid filename: contains disallowed characters")]
    InvalidFilename,

    #[error("URL points at a local or private host: {0}")]
    PrivateHost(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

/// Validate a URL supplied by a third party before fetching it.
///
/// Only http and https are accepted. Unless `allow_private` is set, loopback,
/// unspecified, link-local and RFC 1918 hosts are rejected.
pub fn validate_url(url: &str, allow_private: bool) -> Result<url::Url, ValidationError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::InvalidUrl("empty URL".to_string()));
    }

    if url.contains('\0') || url.contains('\n') || url.contains('\r') {
        return Err(ValidationError::InvalidUrl(
            "contains control characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::InvalidUrl(format!(
                "invalid scheme: {}",
                other
            )))
        }
    }

    if allow_private {
        return Ok(parsed);
    }

    let private = match parsed.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        None => true,
    };
    if private {
        return Err(ValidationError::PrivateHost(
            parsed.host_str().unwrap_or_default().to_string(),
        ));
    }

    Ok(parsed)
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4 == Ipv4Addr::BROADCAST
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6 == Ipv6Addr::LOCALHOST
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Normalize a DOI for use in request paths.
///
/// DOIs have the format "10.xxxx/xxxxxx" where xxxx is a registrant code
/// and xxxxxx is an item ID. URL and `doi:` prefixes are removed. The stored
/// article DOI is never rewritten with this value.
pub fn validate_doi(doi: &str) -> Result<String, ValidationError> {
    let doi = doi.trim();

    if doi.is_empty() {
        return Err(ValidationError::InvalidDoi("empty DOI".to_string()));
    }

    let lower = doi.to_lowercase();
    let mut doi = lower.as_str();
    for prefix in ["doi:", "https://doi.org/", "http://doi.org/", "https://dx.doi.org/"] {
        doi = doi.strip_prefix(prefix).unwrap_or(doi);
    }

    if !doi.starts_with("10.") {
        return Err(ValidationError::InvalidDoi(
            "DOI must start with '10.'".to_string(),
        ));
    }

    if !doi.contains('/') {
        return Err(ValidationError::InvalidDoi(
            "DOI must contain a slash".to_string(),
        ));
    }

    if doi.contains("..") || doi.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::InvalidDoi(format!(
            "contains disallowed characters: {}",
            doi
        )));
    }

    Ok(doi.to_string())
}

/// Percent-encode each segment of a DOI for use as a URL path.
///
/// DOIs may contain `#`, `?` or `;`, which would otherwise end the path.
/// The `/` separators are kept.
pub fn encode_doi_path(doi: &str) -> String {
    doi.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check a blob name before it is used as a path component.
///
/// Path separators and traversal sequences are rejected outright; the name is
/// otherwise returned unchanged so the stored name matches `Article::file_name`.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    if filename.trim().is_empty() || filename.contains('\0') {
        return Err(ValidationError::InvalidFilename);
    }

    if filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains(':')
    {
        return Err(ValidationError::PathTraversal(filename.to_string()));
    }

    const MAX_FILENAME_LENGTH: usize = 255;
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::InvalidFilename);
    }

    Ok(filename.to_string())
}
