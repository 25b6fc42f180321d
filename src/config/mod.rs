//! Configuration module for vislink-rs
//!
//! A single [`DeviceConfig`] describes how [`Device::open`](crate::device::Device::open)
//! finds, boots and talks to a device:
//!
//! - which device to connect to ([`TransportTarget`])
//! - how to boot it ([`BootMode`])
//! - default host queue sizing ([`QueueOptions`])
//! - event backlog capacity, search timeout and worker poll interval
//!
//! # Files
//!
//! Configs load from TOML (`.toml`) or JSON (anything else) and are saved as
//! pretty JSON.
//!
//! # Example
//!
//! ```ignore
//! use vislink_rs::config::{DeviceConfig, TransportTarget};
//!
//! let mut config = DeviceConfig::load("device.toml")?;
//! config.transport = TransportTarget::Mxid("14442C10D13EABCE00".into());
//! config.save("device.json")?;
//! ```

use crate::error::{Result, VisLinkError};
use crate::queue::QueueOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::queue::{OverflowPolicy, DEFAULT_QUEUE_SIZE, EVENT_QUEUE_MAXIMUM_SIZE};

/// Default time to search for a device, in milliseconds
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 3000;

/// Default interval the workers wait on the transport, in milliseconds
pub const DEFAULT_RECEIVE_POLL_MS: u64 = 10;

/// Default queue size of node input ports on the device
pub const DEFAULT_NODE_INPUT_QUEUE_SIZE: u32 = 8;

/// Which device to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransportTarget {
    /// First available device
    #[default]
    Any,
    /// Device with this MX id
    Mxid(String),
    /// Device with this name (USB port path or IP address)
    Name(String),
}

impl TransportTarget {
    /// Whether a device with `mxid` and `name` satisfies this target
    pub fn matches(&self, mxid: &str, name: &str) -> bool {
        match self {
            TransportTarget::Any => true,
            TransportTarget::Mxid(id) => id == mxid,
            TransportTarget::Name(n) => n == name,
        }
    }
}

impl std::fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportTarget::Any => write!(f, "any device"),
            TransportTarget::Mxid(id) => write!(f, "mxid {}", id),
            TransportTarget::Name(name) => write!(f, "name {}", name),
        }
    }
}

/// How the device is booted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BootMode {
    #[default]
    Default,
    /// Force USB2 link speed
    Usb2,
    /// Boot a firmware image from disk
    CustomFirmware(PathBuf),
}

/// Device connection and queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub transport: TransportTarget,

    #[serde(default)]
    pub boot: BootMode,

    /// How long to search for a matching device
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Options for queues opened without explicit options
    #[serde(default)]
    pub default_queue: QueueOptions,

    /// Event backlog capacity
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Refuse to run against any other firmware version
    #[serde(default)]
    pub expected_firmware: Option<String>,

    /// How long the worker threads block on the transport per iteration
    #[serde(default = "default_receive_poll_ms")]
    pub receive_poll_ms: u64,
}

fn default_search_timeout_ms() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_MS
}

fn default_event_queue_capacity() -> usize {
    EVENT_QUEUE_MAXIMUM_SIZE
}

fn default_receive_poll_ms() -> u64 {
    DEFAULT_RECEIVE_POLL_MS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transport: TransportTarget::Any,
            boot: BootMode::Default,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            default_queue: QueueOptions::default(),
            event_queue_capacity: EVENT_QUEUE_MAXIMUM_SIZE,
            expected_firmware: None,
            receive_poll_ms: DEFAULT_RECEIVE_POLL_MS,
        }
    }
}

impl DeviceConfig {
    pub fn with_target(mut self, target: TransportTarget) -> Self {
        self.transport = target;
        self
    }

    pub fn with_default_queue(mut self, options: QueueOptions) -> Self {
        self.default_queue = options;
        self
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms.max(1))
    }

    /// Check that the values are usable
    pub fn validate(&self) -> Result<()> {
        self.default_queue.validate()?;
        if self.event_queue_capacity == 0 {
            return Err(VisLinkError::Config(
                "event_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.receive_poll_ms == 0 {
            return Err(VisLinkError::Config(
                "receive_poll_ms must be at least 1".to_string(),
            ));
        }
        if let BootMode::CustomFirmware(path) = &self.boot {
            if !path.exists() {
                return Err(VisLinkError::Config(format!(
                    "Firmware image {:?} does not exist",
                    path
                )));
            }
        }
        Ok(())
    }

    /// Load a config file; `.toml` files are parsed as TOML, everything else as JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisLinkError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: DeviceConfig = if is_toml {
            toml::from_str(&content).map_err(|e| {
                VisLinkError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                VisLinkError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        tracing::debug!("Loaded device config from {:?}", path);
        Ok(config)
    }

    /// Load a config file, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default device config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the config as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VisLinkError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| VisLinkError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            VisLinkError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.transport, TransportTarget::Any);
        assert_eq!(config.event_queue_capacity, 2048);
        assert_eq!(config.default_queue.max_size, DEFAULT_QUEUE_SIZE);
        assert!(config.default_queue.policy.is_blocking());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"transport": {"Mxid": "1844301011"}}"#).unwrap();
        assert_eq!(config.transport, TransportTarget::Mxid("1844301011".into()));
        assert_eq!(config.search_timeout_ms, DEFAULT_SEARCH_TIMEOUT_MS);
        assert_eq!(config.receive_poll(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DeviceConfig = toml::from_str(
            r#"
            event_queue_capacity = 64

            [default_queue]
            max_size = 4
            policy = "DropOldest"
            "#,
        )
        .unwrap();
        assert_eq!(config.event_queue_capacity, 64);
        assert_eq!(config.default_queue, QueueOptions::drop_oldest(4));
        assert_eq!(config.boot, BootMode::Default);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = DeviceConfig::default();
        config.event_queue_capacity = 0;
        assert!(config.validate().is_err());

        let config = DeviceConfig::default().with_default_queue(QueueOptions::blocking(0));
        assert!(matches!(config.validate(), Err(VisLinkError::Config(_))));
    }

    #[test]
    fn test_validate_missing_firmware_image() {
        let config = DeviceConfig {
            boot: BootMode::CustomFirmware(PathBuf::from("/nonexistent/fw.mvcmd")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_target_matches() {
        assert!(TransportTarget::Any.matches("a", "b"));
        assert!(TransportTarget::Mxid("a".into()).matches("a", "b"));
        assert!(!TransportTarget::Name("x".into()).matches("a", "b"));
    }
}
