//! Configuration file parser for ~/.config/bloghub/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. `BLOGHUB_FETCH_CONCURRENCY` overrides the file.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `fetch_concurrency`.
pub const CONCURRENCY_ENV: &str = "BLOGHUB_FETCH_CONCURRENCY";

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "fetch_concurrency",
    "fetch_timeout_secs",
    "max_feed_bytes",
    "user_agent",
    "summary_width",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Crawler configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `<config dir>/bloghub.db`.
    pub database_path: Option<PathBuf>,

    /// Maximum number of feeds crawled at the same time. Must be at least 1.
    pub fetch_concurrency: usize,

    /// Per-feed deadline covering connect, request and body read.
    pub fetch_timeout_secs: u64,

    /// Feeds larger than this are rejected without parsing.
    pub max_feed_bytes: usize,

    pub user_agent: String,

    /// Stored summaries are truncated to this many display columns.
    pub summary_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_concurrency: 10,
            fetch_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: format!("bloghub/{}", env!("CARGO_PKG_VERSION")),
            summary_width: 280,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
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

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            concurrency = config.fetch_concurrency,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides. `lookup` is usually
    /// `|key| std::env::var(key).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(CONCURRENCY_ENV) {
            self.fetch_concurrency = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: CONCURRENCY_ENV,
                reason: format!("expected a positive integer, got {:?}", raw),
            })?;
            self.validate()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("fetch_concurrency", self.fetch_concurrency as u64),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("max_feed_bytes", self.max_feed_bytes as u64),
            ("summary_width", self.summary_width as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The concurrency ceiling. Validation guarantees it is non-zero; an
    /// unvalidated zero falls back to 1.
    pub fn concurrency(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.fetch_concurrency).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
