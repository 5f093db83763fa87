//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub defaults: ServerDefaults,

    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object naming: `{prefix}{id}{suffix}` per object kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_key_bucket_key_size")]
    pub key_bucket_key_size: u32,

    #[serde(default = "default_key_bucket_prefix")]
    pub key_bucket_prefix: String,

    #[serde(default)]
    pub key_bucket_suffix: String,

    #[serde(default = "default_shard_prefix")]
    pub shard_prefix: String,

    #[serde(default)]
    pub shard_suffix: String,

    #[serde(default = "default_timeline_bucket_prefix")]
    pub timeline_bucket_prefix: String,

    #[serde(default)]
    pub timeline_bucket_suffix: String,

    #[serde(default = "default_timeline_index_prefix")]
    pub timeline_index_prefix: String,

    #[serde(default)]
    pub timeline_index_suffix: String,

    #[serde(default = "default_user_bucket_prefix")]
    pub user_bucket_prefix: String,

    #[serde(default)]
    pub user_bucket_suffix: String,
}

fn default_key_bucket_key_size() -> u32 {
    30
}

fn default_key_bucket_prefix() -> String {
    "kb_".to_string()
}

fn default_shard_prefix() -> String {
    "sha_".to_string()
}

fn default_timeline_bucket_prefix() -> String {
    "tb_".to_string()
}

fn default_timeline_index_prefix() -> String {
    "tbx_".to_string()
}

fn default_user_bucket_prefix() -> String {
    "ub_".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            key_bucket_key_size: default_key_bucket_key_size(),
            key_bucket_prefix: default_key_bucket_prefix(),
            key_bucket_suffix: String::new(),
            shard_prefix: default_shard_prefix(),
            shard_suffix: String::new(),
            timeline_bucket_prefix: default_timeline_bucket_prefix(),
            timeline_bucket_suffix: String::new(),
            timeline_index_prefix: default_timeline_index_prefix(),
            timeline_index_suffix: String::new(),
            user_bucket_prefix: default_user_bucket_prefix(),
            user_bucket_suffix: String::new(),
        }
    }
}

impl NamingConfig {
    /// Schema name of a shard
    pub fn shard_name(&self, shard_id: u16) -> String {
        format!("{}{}{}", self.shard_prefix, shard_id, self.shard_suffix)
    }

    pub fn key_bucket_name(&self, bucket_id: u16) -> String {
        format!(
            "{}{}{}",
            self.key_bucket_prefix, bucket_id, self.key_bucket_suffix
        )
    }

    pub fn timeline_bucket_name(&self, bucket_id: u16) -> String {
        format!(
            "{}{}{}",
            self.timeline_bucket_prefix, bucket_id, self.timeline_bucket_suffix
        )
    }

    pub fn timeline_index_name(&self, index_id: u32) -> String {
        format!(
            "{}{}{}",
            self.timeline_index_prefix, index_id, self.timeline_index_suffix
        )
    }

    /// The user bucket is a singleton per shard
    pub fn user_bucket_name(&self) -> String {
        format!("{}users{}", self.user_bucket_prefix, self.user_bucket_suffix)
    }
}

/// Values used for any field a server entry leaves out
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDefaults {
    #[serde(default = "default_driver")]
    pub driver: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_host() -> String {
    ":memory:".to_string()
}

fn default_port() -> u16 {
    3306
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// One `[[servers]]` entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub id: u32,
    pub driver: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub shards: Vec<u16>,
}

/// Cache driver selection
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// "memory" or "none"; anything else disables caching
    #[serde(default = "default_cache_driver")]
    pub driver: String,
}

fn default_cache_driver() -> String {
    "none".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: default_cache_driver(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            error: e.to_string(),
        })
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chronos").join("config.toml")),
            Some(PathBuf::from("/etc/chronos/config.toml")),
            Some(PathBuf::from("./chronos.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Server defaults
        if let Ok(driver) = std::env::var("CHRONOS_DRIVER") {
            self.defaults.driver = driver;
        }
        if let Ok(host) = std::env::var("CHRONOS_HOST") {
            self.defaults.host = host;
        }
        if let Ok(port) = std::env::var("CHRONOS_PORT") {
            if let Ok(p) = port.parse() {
                self.defaults.port = p;
            }
        }
        if let Ok(username) = std::env::var("CHRONOS_USERNAME") {
            self.defaults.username = username;
        }
        if let Ok(password) = std::env::var("CHRONOS_PASSWORD") {
            self.defaults.password = password;
        }

        // Naming
        if let Ok(prefix) = std::env::var("CHRONOS_SHARD_PREFIX") {
            self.naming.shard_prefix = prefix;
        }

        // Cache
        if let Ok(driver) = std::env::var("CHRONOS_CACHE") {
            self.cache.driver = driver;
        }

        // Logging
        if let Ok(level) = std::env::var("CHRONOS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHRONOS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

impl From<ConfigError> for crate::error::ChronosError {
    fn from(err: ConfigError) -> Self {
        crate::error::ChronosError::Config(err.to_string())
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chronos Configuration
#
# Environment variables override these settings:
# - CHRONOS_DRIVER, CHRONOS_HOST, CHRONOS_PORT
# - CHRONOS_USERNAME, CHRONOS_PASSWORD
# - CHRONOS_SHARD_PREFIX
# - CHRONOS_CACHE
# - CHRONOS_LOG_LEVEL, CHRONOS_LOG_FORMAT

[naming]
# Width of the key column in key buckets
key_bucket_key_size = 30

# Object names are {prefix}{id}{suffix}
key_bucket_prefix = "kb_"
key_bucket_suffix = ""
shard_prefix = "sha_"
shard_suffix = ""
timeline_bucket_prefix = "tb_"
timeline_bucket_suffix = ""
timeline_index_prefix = "tbx_"
timeline_index_suffix = ""
user_bucket_prefix = "ub_"
user_bucket_suffix = ""

[defaults]
# Backing store driver (only "sqlite" is supported)
driver = "sqlite"

# Data directory for shard files, or ":memory:" for a volatile server
host = ":memory:"

port = 3306
username = ""
password = ""

# One entry per server; shards listed here are assumed to exist
# [[servers]]
# id = 1
# host = "/var/lib/chronos/server1"
# shards = [1, 2]

[cache]
# Entry cache driver: "memory" or "none"
driver = "none"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_naming() {
        let naming = NamingConfig::default();
        assert_eq!(naming.shard_name(1), "sha_1");
        assert_eq!(naming.key_bucket_name(6), "kb_6");
        assert_eq!(naming.timeline_bucket_name(2), "tb_2");
        assert_eq!(naming.timeline_index_name(3), "tbx_3");
        assert_eq!(naming.user_bucket_name(), "ub_users");
        assert_eq!(naming.key_bucket_key_size, 30);
    }

    #[test]
    fn test_custom_suffixes() {
        let naming = NamingConfig {
            shard_prefix: "tenant_".to_string(),
            shard_suffix: "_db".to_string(),
            timeline_index_suffix: "_idx".to_string(),
            ..NamingConfig::default()
        };
        assert_eq!(naming.shard_name(12), "tenant_12_db");
        assert_eq!(naming.timeline_index_name(4), "tbx_4_idx");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::from_toml(&generate_default_config()).unwrap();
        assert_eq!(config.naming, NamingConfig::default());
        assert_eq!(config.defaults.driver, "sqlite");
        assert_eq!(config.defaults.port, 3306);
        assert_eq!(config.cache.driver, "none");
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_load_servers_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chronos.toml");
        std::fs::write(
            &path,
            r#"
[naming]
shard_prefix = "s_"

[[servers]]
id = 1
shards = [1, 2]

[[servers]]
id = 2
host = "/tmp/chronos"
shards = [3]

[cache]
driver = "memory"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.naming.shard_prefix, "s_");
        assert_eq!(config.naming.timeline_bucket_prefix, "tb_");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].shards, vec![1, 2]);
        assert!(config.servers[0].host.is_none());
        assert_eq!(config.servers[1].host.as_deref(), Some("/tmp/chronos"));
        assert_eq!(config.cache.driver, "memory");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = Config::from_toml("[naming\nshard_prefix = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
