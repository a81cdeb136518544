//! ShopSync Configuration
//!
//! This module provides configuration structures for the replicated
//! catalog service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main ShopSync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopSyncConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Replication configuration
    #[serde(default)]
    pub replication: ReplicationSettings,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Discovery registry configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier (used in logs and status output)
    pub id: String,

    /// Directory holding the store snapshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// How writes reach the secondaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Every secondary is updated and persisted before the caller is answered
    Sync,
    /// The caller is answered after the primary write; a worker catches up later
    Async,
}

impl std::fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationMode::Sync => write!(f, "sync"),
            ReplicationMode::Async => write!(f, "async"),
        }
    }
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Replication strategy
    #[serde(default = "default_mode")]
    pub mode: ReplicationMode,

    /// Names of the secondary stores
    #[serde(default = "default_secondaries")]
    pub secondaries: Vec<String>,

    /// Worker drain interval in milliseconds (async mode)
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

/// Discovery registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Serve the registry alongside the catalog
    #[serde(default)]
    pub enabled: bool,

    /// Registry bind address
    #[serde(default = "default_discovery_address")]
    pub bind_address: String,

    /// Address handed out to clients asking where the catalog lives
    #[serde(default = "default_advertise_address")]
    pub advertise_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_mode() -> ReplicationMode {
    ReplicationMode::Async
}

fn default_secondaries() -> Vec<String> {
    vec!["secondary".to_string()]
}

fn default_drain_interval_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_discovery_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_advertise_address() -> String {
    "localhost:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            secondaries: default_secondaries(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: true,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_discovery_address(),
            advertise_address: default_advertise_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ShopSyncConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ShopSyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.replication.secondaries.is_empty() {
            return Err(crate::Error::Config(
                "replication.secondaries needs at least one store".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.replication.secondaries {
            if name.is_empty() || name == PRIMARY_STORE {
                return Err(crate::Error::Config(format!(
                    "invalid secondary store name '{}'",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(crate::Error::Config(format!(
                    "secondary store '{}' listed twice",
                    name
                )));
            }
        }

        if self.replication.drain_interval_ms == 0 {
            return Err(crate::Error::Config(
                "replication.drain_interval_ms must be greater than zero".into(),
            ));
        }

        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.node.data_dir
    }

    /// Snapshot path for a named store
    pub fn snapshot_path(&self, store: &str) -> PathBuf {
        self.node.data_dir.join(format!("{}_db.json", store))
    }

    /// Get drain interval as Duration
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.replication.drain_interval_ms)
    }
}

/// Name of the primary store
pub const PRIMARY_STORE: &str = "primary";
