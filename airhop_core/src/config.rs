use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::constants::{CHUNK_SIZE, MAX_CHUNK_SIZE, TRANSFER_PORT};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "airhop";
const APP_NAME: &str = "airhop";
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "AIRHOP_CONFIG_DIR";

/// Argv templates for the command-backed wireless driver.
///
/// Every argument may contain `{network}`, replaced with the derived network
/// name. An empty template means the operation is not available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverCommands {
    /// Prints the currently associated network name (empty output = none)
    pub current_network: Vec<String>,
    /// Creates the ad-hoc network
    pub host_network: Vec<String>,
    /// Disables the ad-hoc network created by `host_network`
    pub stop_hosted_network: Vec<String>,
    /// Joins a network by name
    pub join_network: Vec<String>,
    /// Drops the current association
    pub leave_network: Vec<String>,
    /// Exits successfully once a peer has associated with the hosted network
    pub peer_associated: Vec<String>,
    /// Prints the associated peer's IP address
    pub peer_address: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub port: u16,
    pub chunk_size: usize,
    pub dial_attempts: u32,
    pub dial_timeout_ms: u64,
    pub dial_retry_delay_ms: u64,
    pub join_timeout_secs: u64,
    pub find_peer_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub driver_commands: DriverCommands,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            port: TRANSFER_PORT,
            chunk_size: CHUNK_SIZE,
            dial_attempts: 60,
            dial_timeout_ms: 10,
            dial_retry_delay_ms: 1000,
            join_timeout_secs: 60,
            find_peer_timeout_secs: 60,
            poll_interval_ms: 1000,
            driver_commands: DriverCommands::default(),
        }
    }
}

/// Bounded outbound connection schedule for the sending role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        TransferConfig::default().dial_policy()
    }
}

/// Bounds on the wireless association phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimeouts {
    pub join: Duration,
    pub find_peer: Duration,
    pub poll_interval: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        TransferConfig::default().link_timeouts()
    }
}

impl TransferConfig {
    /// Get the config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        let path = match Self::get_config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load config from an explicit path, failing loudly
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "chunk_size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE,
                self.chunk_size
            );
        }
        if self.dial_attempts == 0 {
            anyhow::bail!("dial_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn dial_policy(&self) -> DialPolicy {
        DialPolicy {
            attempts: self.dial_attempts,
            attempt_timeout: Duration::from_millis(self.dial_timeout_ms),
            retry_delay: Duration::from_millis(self.dial_retry_delay_ms),
        }
    }

    pub fn link_timeouts(&self) -> LinkTimeouts {
        LinkTimeouts {
            join: Duration::from_secs(self.join_timeout_secs),
            find_peer: Duration::from_secs(self.find_peer_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
