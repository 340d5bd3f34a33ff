// Client configuration: defaults, optional TOML file, environment override

use crate::error::{NarrationError, Result};
use serde::Deserialize;
use std::path::Path;

pub const API_URL_ENV: &str = "NEEDLE_API_URL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the narration backend, without trailing slash
    pub api_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
    /// Largest narration payload accepted from the service
    pub max_audio_bytes: u64,
    /// Minimum spacing of status snapshots delivered to listeners
    pub status_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            user_agent: format!("needle-audio/{}", env!("CARGO_PKG_VERSION")),
            max_audio_bytes: 64 * 1024 * 1024,
            status_interval_ms: 250,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: ClientConfig = toml::from_str(text)?;
        config.normalize()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            NarrationError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, then apply the environment override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(API_URL_ENV) {
            log::debug!("Using {} from environment", API_URL_ENV);
            config.api_url = url;
        }
        config.normalize()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Result<Self> {
        self.api_url = url.into();
        self.normalize()?;
        Ok(self)
    }

    fn normalize(&mut self) -> Result<()> {
        let trimmed = self.api_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(NarrationError::Config(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        self.api_url = trimmed.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_url = "https://needle.example.com/"
            read_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.api_url, "https://needle.example.com");
        assert_eq!(config.read_timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.status_interval_ms, 250);
        assert_eq!(config.max_audio_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = ClientConfig::default().with_api_url("ftp://nope").unwrap_err();
        assert!(matches!(err, NarrationError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("api_url = ").unwrap_err();
        assert!(matches!(err, NarrationError::Config(_)));
    }
}
