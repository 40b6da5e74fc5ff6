//! Settings file discovery and generation.
//!
//! # Settings File Format
//!
//! ```toml
//! contact_email = "ops@example.org"
//!
//! [crossref]
//! base_url = "https://api.crossref.org/works"
//! filter = "type:journal-article"
//!
//! [unpaywall]
//! base_url = "https://api.unpaywall.org/v2"
//!
//! [storage]
//! container_name = "journal-articles"
//! output_directory = "./articles"
//!
//! [openai]
//! model_name = "gpt-4.1-mini"
//! max_tokens = 100
//! temperature = 0.01
//!
//! [http]
//! timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [resolver]
//! timeout_secs = 60
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [logging]
//! level = "research_agent=info"
//! json = false
//! ```
//!
//! Secrets (storage connection string, OpenAI key) are normally supplied
//! through the environment rather than this file.

use std::path::{Path, PathBuf};

use super::{ConfigError, Settings};

/// Settings file looked for in the working directory
const LOCAL_CONFIG_PATH: &str = "config/settings.toml";

/// The per-user settings path, `<config dir>/research-agent/settings.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("research-agent").join("settings.toml"))
}

/// Find a settings file in the default locations
///
/// `./config/settings.toml` wins over the per-user file.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_PATH);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|p| p.is_file())
}

/// Write the built-in defaults as a TOML settings file
///
/// Refuses to overwrite an existing file.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::Invalid(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&Settings::default())
        .map_err(|e| ConfigError::Invalid(format!("Failed to serialize settings: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
