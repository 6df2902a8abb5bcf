//! gamebox.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::types::AllocationScope;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("allocation.ttl must be at least 1s, got {0:?}")]
    TtlTooShort(Duration),

    #[error("cluster.api_url is required when cluster.mode = \"kube\"")]
    MissingApiUrl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameboxConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub allocation: AllocationConfig,
    pub reclaimer: ReclaimerConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            data_dir: PathBuf::from("/var/lib/gamebox"),
        }
    }
}

/// Which cluster gateway backs the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    /// Kubernetes API server reached over plain HTTP (e.g. `kubectl proxy`).
    #[default]
    Kube,
    /// Objects are only recorded in process memory.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub mode: ClusterMode,
    pub api_url: Option<String>,
    /// Bearer token sent with every API request.
    pub token: Option<String>,
    pub timeout: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: ClusterMode::Kube,
            api_url: Some("http://127.0.0.1:8001".to_string()),
            token: None,
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub ttl: String,
    pub scope: AllocationScope,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            ttl: "1h".to_string(),
            scope: AllocationScope::PerTemplate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimerConfig {
    pub interval: String,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token for `/admin` routes. Admin routes reject every
    /// request while unset.
    pub token: Option<String>,
}

impl GameboxConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: GameboxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every duration parses and the gateway has what it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.allocation_ttl()?;
        if ttl < Duration::from_secs(1) {
            return Err(ConfigError::TtlTooShort(ttl));
        }
        self.reclaim_interval()?;
        self.cluster_timeout()?;
        if self.cluster.mode == ClusterMode::Kube && self.cluster.api_url.is_none() {
            return Err(ConfigError::MissingApiUrl);
        }
        Ok(())
    }

    pub fn allocation_ttl(&self) -> Result<Duration, ConfigError> {
        duration_field("allocation.ttl", &self.allocation.ttl)
    }

    pub fn reclaim_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("reclaimer.interval", &self.reclaimer.interval)
    }

    pub fn cluster_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("cluster.timeout", &self.cluster.timeout)
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}
