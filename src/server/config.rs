//! Server Configuration
//!
//! YAML-backed settings for the HTTP service. Every field has a default, so
//! an empty file (or no file) gives a working server on `0.0.0.0:7860`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::IndexTtsConfig;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for synthesized WAV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Model loading
    #[serde(default)]
    pub model: IndexTtsConfig,

    /// Exit at startup when the model fails to load, instead of serving 503s
    #[serde(default)]
    pub require_model: bool,

    /// Request limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Output cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Max text length, in characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Accepted reference audio extensions (lowercase, with dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Max request body size (bytes)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Max concurrent inference calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            allowed_extensions: default_allowed_extensions(),
            max_body_bytes: default_max_body_bytes(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Output cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the output cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries kept before the older half is dropped
    #[serde(default = "default_cache_size")]
    pub size_limit: usize,

    /// Delete the WAV files of dropped entries
    #[serde(default = "default_true")]
    pub delete_evicted: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_limit: default_cache_size(),
            delete_evicted: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable access log
    #[serde(default = "default_true")]
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_max_text_length() -> usize {
    crate::MAX_TEXT_LENGTH
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".wav".to_string(), ".mp3".to_string(), ".flac".to_string()]
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_max_concurrent() -> usize {
    1
}

fn default_cache_size() -> usize {
    crate::CACHE_SIZE_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    /// Load from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read server config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse server config: {}", path.display()))?;
        Ok(config)
    }

    /// Save to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            output_dir: default_output_dir(),
            model: IndexTtsConfig::default(),
            require_model: false,
            limits: LimitsConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:7860");
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.limits.max_text_length, 500);
        assert_eq!(config.limits.allowed_extensions, vec![".wav", ".mp3", ".flac"]);
        assert_eq!(config.cache.size_limit, 100);
        assert!(config.cache.enabled);
        assert!(!config.require_model);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.port, 7860);
        assert_eq!(config.model.model_dir, PathBuf::from("checkpoints"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");

        let mut config = ServerConfig::default();
        config.port = 9000;
        config.cache.size_limit = 8;
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 9000);
        assert_eq!(loaded.cache.size_limit, 8);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load("/nonexistent/server.yaml").unwrap_err();
        assert!(err.to_string().contains("server.yaml"));
    }
}
