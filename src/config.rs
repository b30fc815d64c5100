use crate::codec::{DeviceInfo, ExtensionAliases};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_ENV_VAR: &str = "TRACKFIT_CONFIG";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Settings that shape the produced FIT file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub device: DeviceInfo,
    pub extensions: ExtensionAliases,
}

/// Top-level configuration of the web service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub codec: CodecConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            codec: CodecConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from the file named by `TRACKFIT_CONFIG`, or fall back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                tracing::info!(path = %path.display(), "loading configuration");
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.codec.device.manufacturer, 255);
        assert_eq!(config.codec.extensions.heart_rate[0], "hr");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            listen_addr = "127.0.0.1:8080"

            [codec.device]
            product = 42

            [codec.extensions]
            cadence = ["rpm"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.codec.device.product, 42);
        assert_eq!(config.codec.device.manufacturer, 255);
        assert_eq!(config.codec.extensions.cadence, vec!["rpm".to_string()]);
        assert_eq!(
            config.codec.extensions.heart_rate,
            ExtensionAliases::default().heart_rate
        );
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = AppConfig::from_toml_str("listen_addr = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = AppConfig::from_file(Path::new("/nonexistent/trackfit.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/trackfit.toml"));
    }
}
