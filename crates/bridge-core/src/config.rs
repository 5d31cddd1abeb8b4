//! Configuration system for the bridge.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BRIDGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/bridge/config.toml
//!   3. ~/.config/bridge/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration. Built once at process start and handed to the
/// pool, dispatcher, worker and gateway by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// SQLite file holding the queues. Shared by every worker and gateway.
    pub path: PathBuf,
    /// Durable queue carrying requests from gateways to workers.
    pub request_queue: String,
    /// How long an idle consumer sleeps between polls.
    pub poll_interval_ms: u64,
    /// A transient queue nobody has consumed from for this long is purged
    /// with its messages on the next declaration.
    pub transient_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mysql,
    /// Process-local store. Every host in `hosts` is reachable.
    Memory,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Candidate hosts, tried front to back on every request.
    pub hosts: Vec<String>,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Upper bound on a single host's connection attempt.
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_attempts: u32,
    /// Backoff after failed attempt `n` (0-based) is `base_delay_ms * (n + 1)`.
    pub base_delay_ms: u64,
    /// Attempt `n` waits `base_timeout_ms + n * timeout_increment_ms` for a reply.
    pub base_timeout_ms: u64,
    pub timeout_increment_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("queues.db"),
            request_queue: "frontend_to_backend".to_string(),
            poll_interval_ms: 200,
            transient_ttl_secs: 600,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mysql,
            hosts: vec!["127.0.0.1".to_string()],
            port: 3306,
            database: "real_estate".to_string(),
            user: "root".to_string(),
            password: String::new(),
            connect_timeout_secs: 3,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            base_timeout_ms: 5000,
            timeout_increment_ms: 2000,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn transient_ttl(&self) -> Duration {
        Duration::from_secs(self.transient_ttl_secs)
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("bridge")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("bridge")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Self::load_from(&path);
        }
        let mut config = BridgeConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load an explicit file, still letting env vars win over it.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        Self::layered(path, |key| std::env::var(key).ok())
    }

    fn layered<F>(path: &std::path::Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BridgeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BRIDGE_* overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRIDGE_BROKER__PATH") {
            self.broker.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BRIDGE_BROKER__REQUEST_QUEUE") {
            self.broker.request_queue = v;
        }
        if let Some(v) = lookup("BRIDGE_BROKER__POLL_INTERVAL_MS") {
            self.broker.poll_interval_ms = parse_env("BRIDGE_BROKER__POLL_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_BROKER__TRANSIENT_TTL_SECS") {
            self.broker.transient_ttl_secs = parse_env("BRIDGE_BROKER__TRANSIENT_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_STORE__BACKEND") {
            self.store.backend = match v.as_str() {
                "mysql" => StoreBackend::Mysql,
                "memory" => StoreBackend::Memory,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "BRIDGE_STORE__BACKEND",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("BRIDGE_STORE__HOSTS") {
            self.store.hosts = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("BRIDGE_STORE__PORT") {
            self.store.port = parse_env("BRIDGE_STORE__PORT", v)?;
        }
        if let Some(v) = lookup("BRIDGE_STORE__DATABASE") {
            self.store.database = v;
        }
        if let Some(v) = lookup("BRIDGE_STORE__USER") {
            self.store.user = v;
        }
        if let Some(v) = lookup("BRIDGE_STORE__PASSWORD") {
            self.store.password = v;
        }
        if let Some(v) = lookup("BRIDGE_STORE__CONNECT_TIMEOUT_SECS") {
            self.store.connect_timeout_secs =
                parse_env("BRIDGE_STORE__CONNECT_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_GATEWAY__MAX_ATTEMPTS") {
            self.gateway.max_attempts = parse_env("BRIDGE_GATEWAY__MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_GATEWAY__BASE_DELAY_MS") {
            self.gateway.base_delay_ms = parse_env("BRIDGE_GATEWAY__BASE_DELAY_MS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_GATEWAY__BASE_TIMEOUT_MS") {
            self.gateway.base_timeout_ms = parse_env("BRIDGE_GATEWAY__BASE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("BRIDGE_GATEWAY__TIMEOUT_INCREMENT_MS") {
            self.gateway.timeout_increment_ms =
                parse_env("BRIDGE_GATEWAY__TIMEOUT_INCREMENT_MS", v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
