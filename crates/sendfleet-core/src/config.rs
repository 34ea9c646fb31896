//! SendFleet configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFleetConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

fn default_data_dir() -> PathBuf {
    SendFleetConfig::home_dir().join("data")
}

impl Default for SendFleetConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gateway: GatewayConfig::default(),
            dispatch: DispatchConfig::default(),
            scheduler: SchedulerConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl SendFleetConfig {
    /// Load config from the default path (~/.sendfleet/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::SendFleetError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::SendFleetError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::SendFleetError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the SendFleet home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sendfleet")
    }
}

/// Gateway (HTTP surface) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for HMAC verification of inbound provider webhooks.
    /// Empty disables signature checks (local development only).
    #[serde(default)]
    pub webhook_secret: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8710
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_secret: String::new(),
        }
    }
}

/// Batch dispatcher pacing knobs. Defaults respect the rate limits of the
/// strictest supported vendors; raise them only with provider approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Wall-clock ceiling on any single provider call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    50
}
fn default_chunk_concurrency() -> usize {
    5
}
fn default_chunk_delay_ms() -> u64 {
    100
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_concurrency: default_chunk_concurrency(),
            chunk_delay_ms: default_chunk_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Reminder scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on reminders processed by one tick; the rest wait for
    /// the next tick.
    #[serde(default = "default_tick_batch_limit")]
    pub tick_batch_limit: usize,
}

fn default_tick_batch_limit() -> usize {
    200
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_batch_limit: default_tick_batch_limit(),
        }
    }
}

/// Credential-at-rest encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "bool_true")]
    pub encrypt: bool,
}

fn bool_true() -> bool {
    true
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { encrypt: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_pacing() {
        let cfg = SendFleetConfig::default();
        assert_eq!(cfg.dispatch.batch_size, 50);
        assert_eq!(cfg.dispatch.chunk_concurrency, 5);
        assert_eq!(cfg.dispatch.chunk_delay_ms, 100);
        assert_eq!(cfg.dispatch.batch_delay_ms, 500);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: SendFleetConfig = toml::from_str(
            r#"
            [gateway]
            port = 9000

            [dispatch]
            batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
        assert_eq!(cfg.dispatch.batch_size, 10);
        assert_eq!(cfg.dispatch.chunk_concurrency, 5);
        assert!(cfg.secrets.encrypt);
    }
}
