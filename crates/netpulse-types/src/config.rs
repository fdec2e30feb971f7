use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{metrics::HealthThresholds, NetpulseError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Base URL of the live probe service. `None` disables the live tier.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub log_path: String,
    pub retention_hours: u64,
    /// Keep the log in memory only.
    #[serde(default)]
    pub in_memory: bool,
    /// Bound on a single log read or write before it counts as failed.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_path: "data/metrics.jsonl".into(),
            retention_hours: 24,
            in_memory: false,
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Longest cache TTL accepted from configuration.
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_entries: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_hours: u32,
    pub default_days: u32,
    pub day_interval_hours: u32,
    pub max_hours: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_hours: 24,
            default_days: 30,
            day_interval_hours: 3,
            max_hours: 24 * 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub data_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            data_dir: "data".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetpulseConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ops: OpsConfig,
    #[serde(default)]
    pub health: HealthThresholds,
}

impl NetpulseConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            NetpulseError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            NetpulseError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe.timeout_ms == 0 {
            return Err(NetpulseError::Configuration(
                "probe.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.store.retention_hours == 0 {
            return Err(NetpulseError::Configuration(
                "store.retention_hours must be greater than zero".into(),
            ));
        }
        if !self.store.in_memory && self.store.log_path.trim().is_empty() {
            return Err(NetpulseError::Configuration(
                "store.log_path must be set unless store.in_memory is enabled".into(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(NetpulseError::Configuration(
                "store.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.cache.ttl_secs == 0 || self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(NetpulseError::Configuration(format!(
                "cache.ttl_secs must be between 1 and {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(NetpulseError::Configuration(
                "cache.max_entries must be greater than zero".into(),
            ));
        }
        if self.history.default_hours == 0 || self.history.default_days == 0 {
            return Err(NetpulseError::Configuration(
                "history defaults must be greater than zero".into(),
            ));
        }
        if self.history.day_interval_hours == 0 || 24 % self.history.day_interval_hours != 0 {
            return Err(NetpulseError::Configuration(
                "history.day_interval_hours must divide 24".into(),
            ));
        }
        if self.history.max_hours < self.history.default_hours {
            return Err(NetpulseError::Configuration(
                "history.max_hours must cover history.default_hours".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(NetpulseError::Configuration(
                "server.port must be a valid port (>0)".into(),
            ));
        }
        if self.server.event_capacity == 0 {
            return Err(NetpulseError::Configuration(
                "server.event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
