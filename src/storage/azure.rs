//! Azure Blob Storage over the REST API.
//!
//! Uploads use `Put Blob` with `x-ms-blob-type: BlockBlob`, which creates or
//! replaces the blob in one request. Requests are authorized with the account
//! key (Shared Key) or with a SAS token, whichever the connection string
//! carries.
//! API documentation: <https://learn.microsoft.com/rest/api/storageservices/put-blob>

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::HttpSettings;
use crate::storage::{BlobStore, StorageError, PDF_CONTENT_TYPE};
use crate::utils::{sanitize_filename, HttpClient, DEFAULT_USER_AGENT};

/// REST API version sent with every request
const API_VERSION: &str = "2021-08-06";

type HmacSha256 = Hmac<Sha256>;

/// Parsed `Key=Value;...` storage connection string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionString {
    pub protocol: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub endpoint_suffix: Option<String>,
    pub blob_endpoint: Option<String>,
    pub sas_token: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut parsed = ConnectionString::default();

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::Config(format!("malformed connection string segment '{}'", key_only(part)))
            })?;
            let value = Some(value.to_string());
            match key {
                "DefaultEndpointsProtocol" => parsed.protocol = value,
                "AccountName" => parsed.account_name = value,
                "AccountKey" => parsed.account_key = value,
                "EndpointSuffix" => parsed.endpoint_suffix = value,
                "BlobEndpoint" => parsed.blob_endpoint = value,
                "SharedAccessSignature" => {
                    parsed.sas_token = value.map(|v| v.trim_start_matches('?').to_string())
                }
                _ => tracing::debug!("Ignoring connection string key {}", key),
            }
        }

        Ok(parsed)
    }

    /// Blob service endpoint, without a trailing slash
    pub fn blob_endpoint(&self) -> Result<String, StorageError> {
        if let Some(endpoint) = &self.blob_endpoint {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }
        let account = self.account_name.as_deref().ok_or_else(|| {
            StorageError::Config("connection string has neither BlobEndpoint nor AccountName".to_string())
        })?;
        Ok(format!(
            "{}://{}.blob.{}",
            self.protocol.as_deref().unwrap_or("https"),
            account,
            self.endpoint_suffix.as_deref().unwrap_or("core.windows.net")
        ))
    }
}

/// Never echo a segment's value, it may hold the account key
fn key_only(segment: &str) -> &str {
    segment.split('=').next().unwrap_or_default()
}

enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => write!(f, "SharedKey({})", account),
            Credential::Sas(_) => write!(f, "Sas"),
        }
    }
}

/// Blob store backed by one Azure container
#[derive(Debug)]
pub struct AzureBlobStore {
    endpoint: String,
    container: String,
    credential: Credential,
    http: HttpClient,
}

impl AzureBlobStore {
    pub fn new(
        conn: ConnectionString,
        container: &str,
        http: &HttpSettings,
    ) -> Result<Self, StorageError> {
        let endpoint = conn.blob_endpoint()?;

        let credential = match (&conn.account_name, &conn.account_key, &conn.sas_token) {
            (Some(account), Some(key), _) => Credential::SharedKey {
                account: account.clone(),
                key: BASE64
                    .decode(key.trim())
                    .map_err(|e| StorageError::Config(format!("AccountKey is not base64: {}", e)))?,
            },
            (_, _, Some(sas)) => Credential::Sas(sas.clone()),
            _ => {
                return Err(StorageError::Config(
                    "connection string needs AccountName and AccountKey, or SharedAccessSignature"
                        .to_string(),
                ))
            }
        };

        let http = HttpClient::with_settings(DEFAULT_USER_AGENT, http)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            endpoint,
            container: container.to_string(),
            credential,
            http,
        })
    }

    /// Public URL of a blob (never includes the SAS token)
    pub fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.container,
            urlencoding::encode(name)
        )
    }

    fn authorization(
        &self,
        account: &str,
        key: &[u8],
        url: &str,
        content_length: usize,
        ms_headers: &[(&str, &str)],
    ) -> Result<String, StorageError> {
        let path = url::Url::parse(url)
            .map_err(|e| StorageError::InvalidName(e.to_string()))?
            .path()
            .to_string();
        let resource = format!("/{}{}", account, path);
        let to_sign = string_to_sign("PUT", content_length, PDF_CONTENT_TYPE, ms_headers, &resource);

        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| StorageError::Config(format!("invalid account key: {}", e)))?;
        mac.update(to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", account, signature))
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn name(&self) -> &str {
        "azure"
    }

    async fn upload_pdf(&self, name: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let name = sanitize_filename(name).map_err(|e| StorageError::InvalidName(e.to_string()))?;
        let blob_url = self.blob_url(&name);
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let length = bytes.len();

        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
        ];

        let (request_url, authorization) = match &self.credential {
            Credential::SharedKey { account, key } => (
                blob_url.clone(),
                Some(self.authorization(account, key, &blob_url, length, &ms_headers)?),
            ),
            Credential::Sas(sas) => (format!("{}?{}", blob_url, sas), None),
        };

        let mut request = self
            .http
            .put(&request_url)
            .header(reqwest::header::CONTENT_TYPE, PDF_CONTENT_TYPE);
        for (header, value) in ms_headers {
            request = request.header(header, value);
        }
        if let Some(auth) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.body(bytes).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        tracing::debug!(blob = %name, bytes = length, "Uploaded blob to Azure");
        Ok(blob_url)
    }

    async fn startup(&self) -> Result<(), StorageError> {
        tracing::info!(endpoint = %self.endpoint, container = %self.container, "Azure blob store ready");
        Ok(())
    }
}

/// Shared Key string-to-sign for a request without conditional headers
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    // Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    let standard = ["", "", length.as_str(), "", content_type, "", "", "", "", "", ""];

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str(verb);
    out.push('\n');
    for value in standard {
        out.push_str(value);
        out.push('\n');
    }
    for (k, v) in headers {
        out.push_str(&k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out.push_str(canonical_resource);
    out
}
