//! Configuration file parser for ~/.config/gleaner/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! CLI flags and environment variables (`SOURCEID`, `NATS_URL`) take
//! precedence over file values; that resolution happens in the binary.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::FetchLimits;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level worker configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,

    /// NATS server URL (`NATS_URL` env var takes precedence).
    pub nats_url: String,

    /// Source to ingest when neither `--source-id` nor `SOURCEID` is set.
    pub source_id: Option<String>,

    /// Per-request feed fetch timeout in seconds.
    pub fetch_timeout_secs: u64,

    /// Maximum feed response size in bytes.
    pub max_feed_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "gleaner.db".to_string(),
            nats_url: "nats://127.0.0.1:4222".to_string(),
            source_id: None,
            fetch_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The fetch bounds this configuration implies.
    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_bytes: self.max_feed_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/gleaner.toml")).unwrap();
        assert_eq!(config.database_path, "gleaner.db");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert!(config.source_id.is_none());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let mut file = tempfile_path("partial");
        writeln!(file.1, "source_id = \"s1\"").unwrap();

        let config = Config::load(&file.0).unwrap();
        assert_eq!(config.source_id.as_deref(), Some("s1"));
        assert_eq!(config.nats_url, "nats://127.0.0.1:4222");

        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile_path("invalid");
        writeln!(file.1, "source_id = [unclosed").unwrap();

        assert!(matches!(
            Config::load(&file.0),
            Err(ConfigError::Parse(_))
        ));

        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn test_fetch_limits_mapping() {
        let config = Config {
            fetch_timeout_secs: 5,
            max_feed_bytes: 1024,
            ..Config::default()
        };
        let limits = config.fetch_limits();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.max_bytes, 1024);
    }

    fn tempfile_path(tag: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!(
            "gleaner-config-test-{}-{}.toml",
            tag,
            std::process::id()
        ));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
