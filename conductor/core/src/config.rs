//! Configuration
//!
//! Settings for the store connection, stream pacing and key lifetimes.
//!
//! # Configuration Priority
//!
//! Values are layered with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The file lives at `$XDG_CONFIG_HOME/stream-conductor/conductor.toml`
//! (typically `~/.config/stream-conductor/conductor.toml`). A missing file
//! is not an error.
//!
//! # Example Configuration
//!
//! ```toml
//! [store]
//! url = "redis://localhost:6379/0"
//! key_prefix = "chat"
//!
//! [stream]
//! chunk_interval_ms = 100
//! cancel_check_interval = 10
//!
//! [ttl]
//! history_secs = 86400
//! active_stream_secs = 300
//! cancel_secs = 60
//! speculative_cancel_secs = 10
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Setting |
//! |---|---|
//! | `REDIS_URL` | store URL |
//! | `CONDUCTOR_KEY_PREFIX` | key namespace |
//! | `CHUNK_INTERVAL_MS` | pause after each unit |
//! | `CANCEL_CHECK_INTERVAL` | units between cancel checks |
//! | `CHAT_HISTORY_TTL` | history retention (seconds) |
//! | `ACTIVE_STREAM_TTL` | active record lifetime (seconds) |
//! | `CANCEL_TTL` | cancel signal lifetime (seconds) |
//! | `SPECULATIVE_CANCEL_TTL` | speculative signal lifetime (seconds) |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::DEFAULT_HISTORY_TTL;
use crate::registry::{
    RegistryTtls, DEFAULT_ACTIVE_STREAM_TTL, DEFAULT_CANCEL_TTL, DEFAULT_SPECULATIVE_CANCEL_TTL,
};
use crate::store::{KeySpace, DEFAULT_KEY_PREFIX};
use crate::streaming::{StreamSettings, DEFAULT_CANCEL_CHECK_INTERVAL, DEFAULT_CHUNK_INTERVAL};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the highest-priority value in a configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[store]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// Store URL (`redis://...` or `memory://`)
    pub url: Option<String>,
    /// Key namespace
    pub key_prefix: Option<String>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Pause after each published unit, in milliseconds
    pub chunk_interval_ms: Option<u64>,
    /// Units between cancellation checks
    pub cancel_check_interval: Option<u32>,
}

/// `[ttl]` section, all values in seconds
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlToml {
    /// History retention
    pub history_secs: Option<u64>,
    /// Active record lifetime
    pub active_stream_secs: Option<u64>,
    /// Cancel signal lifetime
    pub cancel_secs: Option<u64>,
    /// Speculative cancel signal lifetime
    pub speculative_cancel_secs: Option<u64>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Store connection
    pub store: StoreToml,
    /// Stream pacing
    pub stream: StreamToml,
    /// Key lifetimes
    pub ttl: TtlToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved conductor configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConductorConfig {
    /// Store URL; `None` selects the in-memory store
    pub store_url: Option<String>,
    /// Key namespace
    pub key_prefix: String,
    /// Pause after each published unit
    pub chunk_interval: Duration,
    /// Units between cancellation checks
    pub cancel_check_interval: u32,
    /// History retention
    pub history_ttl: Duration,
    /// Active record lifetime
    pub active_stream_ttl: Duration,
    /// Cancel signal lifetime for an active stream
    pub cancel_ttl: Duration,
    /// Cancel signal lifetime when no stream is active
    pub speculative_cancel_ttl: Duration,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            history_ttl: DEFAULT_HISTORY_TTL,
            active_stream_ttl: DEFAULT_ACTIVE_STREAM_TTL,
            cancel_ttl: DEFAULT_CANCEL_TTL,
            speculative_cancel_ttl: DEFAULT_SPECULATIVE_CANCEL_TTL,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfig {
    /// Defaults overridden by environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_config(&mut config, |name| std::env::var(name).ok());
        config
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Key namespace for the store
    #[must_use]
    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.as_str())
    }

    /// Stream pacing
    #[must_use]
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_interval: self.chunk_interval,
            cancel_check_interval: self.cancel_check_interval,
        }
    }

    /// Registry lifetimes
    #[must_use]
    pub fn registry_ttls(&self) -> RegistryTtls {
        RegistryTtls {
            active_stream: self.active_stream_ttl,
            cancel: self.cancel_ttl,
            speculative_cancel: self.speculative_cancel_ttl,
        }
    }

    /// Reject values the store cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cancel_check_interval == 0 {
            return Err(ConfigError::ValidationError(
                "cancel_check_interval must be at least 1".into(),
            ));
        }
        let ttls = [
            ("history_ttl", self.history_ttl),
            ("active_stream_ttl", self.active_stream_ttl),
            ("cancel_ttl", self.cancel_ttl),
            ("speculative_cancel_ttl", self.speculative_cancel_ttl),
        ];
        for (name, ttl) in ttls {
            if ttl.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stream-conductor").join("conductor.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the result is
/// invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ConductorConfig, ConfigError> {
    let mut config = ConductorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut ConductorConfig, toml: &ConductorToml) {
    if let Some(ref url) = toml.store.url {
        config.store_url = Some(url.clone());
    }
    if let Some(ref prefix) = toml.store.key_prefix {
        config.key_prefix = prefix.clone();
    }

    if let Some(ms) = toml.stream.chunk_interval_ms {
        config.chunk_interval = Duration::from_millis(ms);
    }
    if let Some(k) = toml.stream.cancel_check_interval {
        config.cancel_check_interval = k;
    }

    if let Some(secs) = toml.ttl.history_secs {
        config.history_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.ttl.active_stream_secs {
        config.active_stream_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.ttl.cancel_secs {
        config.cancel_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.ttl.speculative_cancel_secs {
        config.speculative_cancel_ttl = Duration::from_secs(secs);
    }
}

fn apply_env_config(config: &mut ConductorConfig, env: impl Fn(&str) -> Option<String>) {
    let parsed = |name: &str| env(name).and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(url) = env("REDIS_URL") {
        config.store_url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(prefix) = env("CONDUCTOR_KEY_PREFIX") {
        config.key_prefix = prefix;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parsed("CHUNK_INTERVAL_MS") {
        config.chunk_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(k) = env("CANCEL_CHECK_INTERVAL").and_then(|v| v.trim().parse::<u32>().ok()) {
        config.cancel_check_interval = k;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("CHAT_HISTORY_TTL") {
        config.history_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("ACTIVE_STREAM_TTL") {
        config.active_stream_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("CANCEL_TTL") {
        config.cancel_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("SPECULATIVE_CANCEL_TTL") {
        config.speculative_cancel_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Store URL override
    pub store_url: Option<String>,
    /// Key prefix override
    pub key_prefix: Option<String>,
    /// Chunk interval override (milliseconds)
    pub chunk_interval_ms: Option<u64>,
    /// Cancel check interval override
    pub cancel_check_interval: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set store URL override
    #[must_use]
    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    /// Set key prefix override
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set chunk interval override
    #[must_use]
    pub fn with_chunk_interval_ms(mut self, ms: u64) -> Self {
        self.chunk_interval_ms = Some(ms);
        self
    }

    /// Set cancel check interval override
    #[must_use]
    pub fn with_cancel_check_interval(mut self, k: u32) -> Self {
        self.cancel_check_interval = Some(k);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ConductorConfig) {
        if self.store_url.is_some()
            || self.key_prefix.is_some()
            || self.chunk_interval_ms.is_some()
            || self.cancel_check_interval.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.store_url {
            config.store_url = Some(url.clone());
        }
        if let Some(ref prefix) = self.key_prefix {
            config.key_prefix = prefix.clone();
        }
        if let Some(ms) = self.chunk_interval_ms {
            config.chunk_interval = Duration::from_millis(ms);
        }
        if let Some(k) = self.cancel_check_interval {
            config.cancel_check_interval = k;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        |_| None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ConductorConfig::default();

        assert_eq!(config.store_url, None);
        assert_eq!(config.key_prefix, "chat");
        assert_eq!(config.chunk_interval, Duration::from_millis(100));
        assert_eq!(config.cancel_check_interval, 10);
        assert_eq!(config.history_ttl, Duration::from_secs(86_400));
        assert_eq!(config.active_stream_ttl, Duration::from_secs(300));
        assert_eq!(config.cancel_ttl, Duration::from_secs(60));
        assert_eq!(config.speculative_cancel_ttl, Duration::from_secs(10));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("stream-conductor/conductor.toml"));
        }
    }

    // =========================================================================
    // File Loading
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[store]
url = "redis://cache:6379/2"
key_prefix = "tenant-a"

[stream]
chunk_interval_ms = 0
cancel_check_interval = 3

[ttl]
history_secs = 3600
active_stream_secs = 120
cancel_secs = 30
speculative_cancel_secs = 5
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env()).unwrap();
        assert_eq!(config.store_url.as_deref(), Some("redis://cache:6379/2"));
        assert_eq!(config.key_space().prefix(), "tenant-a");
        assert_eq!(config.chunk_interval, Duration::ZERO);
        assert_eq!(config.cancel_check_interval, 3);
        assert_eq!(config.history_ttl, Duration::from_secs(3600));
        assert_eq!(config.registry_ttls().active_stream, Duration::from_secs(120));
        assert_eq!(config.registry_ttls().cancel, Duration::from_secs(30));
        assert_eq!(config.registry_ttls().speculative_cancel, Duration::from_secs(5));
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = write_toml("[stream]\ncancel_check_interval = 5\n");

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env()).unwrap();
        assert_eq!(config.cancel_check_interval, 5);
        assert_eq!(config.chunk_interval, DEFAULT_CHUNK_INTERVAL);
        assert_eq!(config.key_prefix, "chat");
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/stream-conductor/conductor.toml");
        let config = load_config_with_env(Some(path), no_env()).unwrap();
        assert_eq!(config, ConductorConfig::default());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_toml("[stream\nchunk_interval_ms = \"fast\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env());
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let file = write_toml("[ttl]\ncancel_secs = 0\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env());
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    // =========================================================================
    // Priority Ordering
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[store]\nkey_prefix = \"file\"\n\n[stream]\nchunk_interval_ms = 250\n");
        let env = env_from(&[
            ("CONDUCTOR_KEY_PREFIX", "env"),
            ("REDIS_URL", "redis://env:6379"),
            ("CHAT_HISTORY_TTL", "60"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.key_prefix, "env");
        assert_eq!(config.store_url.as_deref(), Some("redis://env:6379"));
        assert_eq!(config.history_ttl, Duration::from_secs(60));
        // Not overridden by env
        assert_eq!(config.chunk_interval, Duration::from_millis(250));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let mut config = ConductorConfig::default();
        apply_env_config(
            &mut config,
            env_from(&[("CANCEL_CHECK_INTERVAL", "often"), ("CANCEL_TTL", "-1")]),
        );
        assert_eq!(config.cancel_check_interval, DEFAULT_CANCEL_CHECK_INTERVAL);
        assert_eq!(config.cancel_ttl, DEFAULT_CANCEL_TTL);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = ConductorConfig::default();
        apply_env_config(&mut config, env_from(&[("CHUNK_INTERVAL_MS", "500")]));
        assert_eq!(config.source(), ConfigSource::Env);

        ConfigOverrides::new()
            .with_chunk_interval_ms(0)
            .with_store_url("memory://")
            .apply(&mut config);

        assert_eq!(config.chunk_interval, Duration::ZERO);
        assert_eq!(config.store_url.as_deref(), Some("memory://"));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ConductorConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
