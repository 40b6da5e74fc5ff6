//! Configuration management.
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. a TOML settings file (see [`find_config_file`])
//! 3. `RESEARCH_AGENT__SECTION__KEY` environment variables
//! 4. the flat variables the deployment already uses (`EMAIL`,
//!    `CROSSREF_BASE_URL`, `AZURE_STORAGE_CONNECTION_STRING`, ...)
//!
//! A `.env` file in the working directory is read first.

mod file_config;

pub use file_config::{default_config_path, find_config_file, write_default_config};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Flat environment variables and the settings keys they override
pub const LEGACY_ENV_VARS: &[(&str, &str)] = &[
    ("EMAIL", "contact_email"),
    ("CROSSREF_BASE_URL", "crossref.base_url"),
    ("UNPAYWALL_BASE_URL", "unpaywall.base_url"),
    ("JOURNAL_ARTICLE_DIRECTORY", "storage.output_directory"),
    ("AZURE_STORAGE_CONNECTION_STRING", "storage.connection_string"),
    ("STORAGE_ACCOUNT_NAME", "storage.account_name"),
    ("STORAGE_CONTAINER_NAME", "storage.container_name"),
    ("AZURE_OPENAI_ENDPOINT", "openai.endpoint"),
    ("AZURE_OPENAI_API_KEY", "openai.api_key"),
    ("AZURE_OPENAI_VERSION", "openai.api_version"),
    ("MONGODB_CONNECTION_STRING", "log_store.connection_string"),
    ("MONGODB_DB_NAME", "log_store.database"),
    ("MONGODB_LOG_COLLECTION", "log_store.collection"),
];

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Operator contact email sent to the bibliographic indexes
    pub contact_email: Option<String>,

    pub crossref: CrossRefSettings,
    pub unpaywall: UnpaywallSettings,
    pub storage: StorageSettings,
    pub openai: OpenAiSettings,
    pub http: HttpSettings,
    pub resolver: ResolverSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub log_store: LogStoreSettings,
}

/// Metadata index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossRefSettings {
    /// Works search endpoint
    pub base_url: String,

    /// Fixed record-type filter sent with every search
    pub filter: String,
}

impl Default for CrossRefSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.crossref.org/works".to_string(),
            filter: "type:journal-article".to_string(),
        }
    }
}

/// Open-access index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpaywallSettings {
    pub base_url: String,
}

impl Default for UnpaywallSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.unpaywall.org/v2".to_string(),
        }
    }
}

/// Blob storage settings
///
/// Azure is used when a connection string is present, otherwise PDFs are
/// written to `output_directory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub connection_string: Option<String>,
    pub account_name: Option<String>,
    pub container_name: Option<String>,
    pub output_directory: Option<PathBuf>,
}

/// Azure OpenAI chat settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,

    /// Deployment / model name
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: None,
            model_name: "gpt-4.1-mini".to_string(),
            max_tokens: 100,
            temperature: 0.01,
        }
    }
}

/// Outbound HTTP timeouts, applied per request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// PDF resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Timeout for each lookup or download the resolver makes
    pub timeout_secs: u64,

    /// Largest accepted PDF
    pub max_pdf_bytes: u64,

    /// Allow candidate URLs on loopback or private networks
    pub allow_private_hosts: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_pdf_bytes: 100 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "research_agent=debug"
    pub level: Option<String>,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

/// Warning and error log store settings
///
/// The store is enabled only when a connection string is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStoreSettings {
    pub connection_string: Option<String>,
    pub database: String,
    pub collection: String,
    pub connect_timeout_secs: u64,

    /// Records buffered while the store is slow or not yet connected
    pub channel_capacity: usize,
}

impl Default for LogStoreSettings {
    fn default() -> Self {
        Self {
            connection_string: None,
            database: "ml-research-agent".to_string(),
            collection: "error-collection".to_string(),
            connect_timeout_secs: 30,
            channel_capacity: 1024,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Settings {
    /// Load settings from the given file (or the discovered one) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to read .env file: {}", e);
            }
        }

        let discovered = match path {
            Some(_) => None,
            None => find_config_file(),
        };
        if let Some(found) = &discovered {
            tracing::info!("Using config file: {}", found.display());
        }

        Self::load_with_env(path.or(discovered.as_deref()), std::env::vars().collect())
    }

    /// Load settings from an optional file and an explicit environment map.
    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RESEARCH_AGENT")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_ENV_VARS {
            let value = env.get(*var).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder.set_override_option(*key, value)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// The contact email, or an error naming the variable to set
    pub fn contact_email(&self) -> Result<&str, ConfigError> {
        self.contact_email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(vec!["EMAIL".to_string()]))
    }

    /// Check everything the acquisition pipeline needs
    pub fn validate_acquisition(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if self.contact_email().is_err() {
            missing.push("EMAIL".to_string());
        }
        if self.crossref.base_url.trim().is_empty() {
            missing.push("CROSSREF_BASE_URL".to_string());
        }
        if self.unpaywall.base_url.trim().is_empty() {
            missing.push("UNPAYWALL_BASE_URL".to_string());
        }

        let storage = &self.storage;
        if storage.connection_string.is_some() {
            if storage.container_name.as_deref().map_or(true, |c| c.trim().is_empty()) {
                missing.push("STORAGE_CONTAINER_NAME".to_string());
            }
        } else if storage.output_directory.is_none() {
            missing.push(
                "AZURE_STORAGE_CONNECTION_STRING or JOURNAL_ARTICLE_DIRECTORY".to_string(),
            );
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    /// Check everything the chat proxy needs
    pub fn validate_chat(&self) -> Result<(), ConfigError> {
        let openai = &self.openai;
        let missing: Vec<String> = [
            ("AZURE_OPENAI_ENDPOINT", &openai.endpoint),
            ("AZURE_OPENAI_API_KEY", &openai.api_key),
            ("AZURE_OPENAI_VERSION", &openai.api_version),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name.to_string())
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        if openai.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid("openai.model_name is empty".to_string()));
        }
        if !(0.0..=2.0).contains(&openai.temperature) {
            return Err(ConfigError::Invalid(format!(
                "openai.temperature must be between 0 and 2, got {}",
                openai.temperature
            )));
        }
        Ok(())
    }

    /// Check everything the HTTP service needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        for result in [self.validate_acquisition(), self.validate_chat()] {
            match result {
                Ok(()) => {}
                Err(ConfigError::Missing(names)) => missing.extend(names),
                Err(other) => return Err(other),
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::load_with_env(None, HashMap::new()).unwrap();
        assert_eq!(settings.crossref.base_url, "https://api.crossref.org/works");
        assert_eq!(settings.crossref.filter, "type:journal-article");
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.server.port, 8000);
        assert!(settings.contact_email.is_none());
    }

    #[test]
    fn test_legacy_env_vars_override() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("EMAIL", "ops@example.org"),
                ("CROSSREF_BASE_URL", "http://crossref.test/works"),
                ("JOURNAL_ARTICLE_DIRECTORY", "/tmp/articles"),
                ("AZURE_OPENAI_VERSION", "2024-12-01-preview"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.contact_email.as_deref(), Some("ops@example.org"));
        assert_eq!(settings.crossref.base_url, "http://crossref.test/works");
        assert_eq!(
            settings.storage.output_directory,
            Some(PathBuf::from("/tmp/articles"))
        );
        assert_eq!(
            settings.openai.api_version.as_deref(),
            Some("2024-12-01-preview")
        );
        assert!(settings.validate_acquisition().is_ok());
    }

    #[test]
    fn test_prefixed_env_vars() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("RESEARCH_AGENT__HTTP__TIMEOUT_SECS", "5"),
                ("RESEARCH_AGENT__SERVER__PORT", "9000"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.http.timeout_secs, 5);
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
contact_email = "file@example.org"

[openai]
model_name = "gpt-4o-mini"
max_tokens = 256
temperature = 0.2
"#,
        )
        .unwrap();

        let settings =
            Settings::load_with_env(Some(&path), env(&[("EMAIL", "env@example.org")])).unwrap();

        assert_eq!(settings.contact_email.as_deref(), Some("env@example.org"));
        assert_eq!(settings.openai.model_name, "gpt-4o-mini");
        assert_eq!(settings.openai.max_tokens, 256);
        assert!((settings.openai.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_requirements_are_all_reported() {
        let settings = Settings::load_with_env(None, HashMap::new()).unwrap();
        match settings.validate() {
            Err(ConfigError::Missing(names)) => {
                assert!(names.contains(&"EMAIL".to_string()));
                assert!(names.contains(&"AZURE_OPENAI_API_KEY".to_string()));
                assert!(names.iter().any(|n| n.contains("JOURNAL_ARTICLE_DIRECTORY")));
            }
            other => panic!("expected missing configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_azure_storage_requires_container() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("EMAIL", "ops@example.org"),
                ("AZURE_STORAGE_CONNECTION_STRING", "AccountName=a;AccountKey=a2V5"),
            ]),
        )
        .unwrap();
        match settings.validate_acquisition() {
            Err(ConfigError::Missing(names)) => {
                assert_eq!(names, vec!["STORAGE_CONTAINER_NAME".to_string()])
            }
            other => panic!("expected missing container, got {:?}", other),
        }
    }

    #[test]
    fn test_log_store_env_vars() {
        let settings = Settings::load_with_env(None, HashMap::new()).unwrap();
        assert!(settings.log_store.connection_string.is_none());
        assert_eq!(settings.log_store.database, "ml-research-agent");
        assert_eq!(settings.log_store.collection, "error-collection");

        let settings = Settings::load_with_env(
            None,
            env(&[
                ("MONGODB_CONNECTION_STRING", "mongodb://logs.example.org:27017"),
                ("MONGODB_DB_NAME", "agent-logs"),
                ("MONGODB_LOG_COLLECTION", "errors"),
            ]),
        )
        .unwrap();
        assert_eq!(
            settings.log_store.connection_string.as_deref(),
            Some("mongodb://logs.example.org:27017")
        );
        assert_eq!(settings.log_store.database, "agent-logs");
        assert_eq!(settings.log_store.collection, "errors");
    }

    #[test]
    fn test_blank_legacy_values_are_ignored() {
        let settings = Settings::load_with_env(None, env(&[("EMAIL", "  ")])).unwrap();
        assert!(settings.contact_email().is_err());
    }
}
