//! Configuration for MIDI central
//!
//! Loaded from a YAML file; every section is optional and falls back to the
//! defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::catalog::MessageCatalog;
use crate::manager::ManagerOptions;
use crate::radio::{ConnectOptions, MIDI_SERVICE_UUID};
use crate::transport::WirelessOptions;

/// Smallest write that fits one three-byte message with its timestamp
const MIN_CHUNK_SIZE: usize = 5;

/// The wireless timestamp wraps every 8192 ms
const MAX_TIMESTAMP_STEP_MS: u64 = 8191;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Client name announced to the host MIDI subsystem
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub transport: TransportChoice,
    #[serde(default)]
    pub wireless: WirelessConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub host: HostConfig,
    /// Overrides of user-visible strings
    #[serde(default)]
    pub catalog: MessageCatalog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportChoice {
    #[default]
    Local,
    Wireless,
}

/// Wireless link settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WirelessConfig {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_true")]
    pub auto_connect_on_discovery: bool,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Timestamp advance per event in one batch, 0 for a constant stamp
    #[serde(default)]
    pub timestamp_step_ms: u64,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            auto_connect_on_discovery: true,
            auto_reconnect: true,
            timestamp_step_ms: 0,
        }
    }
}

/// Outbound buffering
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Queued events per destination, 0 for no bound
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            buffer_limit: default_buffer_limit(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostBackend {
    /// Fixed sample devices
    #[default]
    Samples,
    /// Live MIDI ports
    Ports,
}

/// Host MIDI enumeration settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub backend: HostBackend,
    /// Only report ports whose name contains this (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_filter: Option<String>,
    /// Re-enumerate this often to pick up hot-plugged ports, 0 disables
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: HostBackend::Samples,
            port_filter: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            transport: TransportChoice::Local,
            wireless: WirelessConfig::default(),
            output: OutputConfig::default(),
            host: HostConfig::default(),
            catalog: MessageCatalog::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load configuration, using defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            anyhow::bail!("client_name cannot be empty");
        }

        Uuid::parse_str(&self.wireless.service_uuid).with_context(|| {
            format!("Invalid wireless service_uuid '{}'", self.wireless.service_uuid)
        })?;

        if self.wireless.timestamp_step_ms > MAX_TIMESTAMP_STEP_MS {
            anyhow::bail!(
                "wireless.timestamp_step_ms {} is too large (must be at most {})",
                self.wireless.timestamp_step_ms,
                MAX_TIMESTAMP_STEP_MS
            );
        }

        if self.output.max_chunk_size < MIN_CHUNK_SIZE {
            anyhow::bail!(
                "output.max_chunk_size {} is too small (must be at least {})",
                self.output.max_chunk_size,
                MIN_CHUNK_SIZE
            );
        }

        if let Some(filter) = &self.host.port_filter {
            if filter.trim().is_empty() {
                anyhow::bail!("host.port_filter cannot be empty, omit it instead");
            }
        }

        Ok(())
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            buffer_limit: self.output.buffer_limit,
            max_chunk_size: self.output.max_chunk_size,
            timestamp_step_ms: self.wireless.timestamp_step_ms,
        }
    }

    pub fn wireless_options(&self) -> Result<WirelessOptions> {
        Ok(WirelessOptions {
            service: Uuid::parse_str(&self.wireless.service_uuid)
                .context("Invalid wireless service_uuid")?,
            auto_connect_on_discovery: self.wireless.auto_connect_on_discovery,
            connect: ConnectOptions {
                auto_reconnect: self.wireless.auto_reconnect,
            },
        })
    }
}

fn default_client_name() -> String {
    "MidiCentral".to_string()
}
fn default_service_uuid() -> String {
    MIDI_SERVICE_UUID.to_string()
}
fn default_true() -> bool {
    true
}
fn default_buffer_limit() -> usize {
    4096
}
fn default_max_chunk_size() -> usize {
    crate::codec::DEFAULT_MAX_CHUNK_SIZE
}
fn default_poll_interval_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.transport, TransportChoice::Local);
        assert_eq!(config.manager_options(), ManagerOptions::default());

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("service_uuid"));
        assert!(!yaml.contains("characteristic"));
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
transport: wireless
wireless:
  timestamp_step_ms: 100
  auto_reconnect: false
output:
  buffer_limit: 0
host:
  backend: ports
  port_filter: "keys"
catalog:
  unknown_device: "Mystery"
"#,
        )
        .unwrap();

        assert_eq!(config.transport, TransportChoice::Wireless);
        assert!(config.wireless.auto_connect_on_discovery);
        assert_eq!(config.manager_options().timestamp_step_ms, 100);
        assert_eq!(config.manager_options().buffer_limit, 0);
        assert_eq!(config.host.backend, HostBackend::Ports);
        assert_eq!(config.catalog.unknown_device, "Mystery");
        assert_eq!(config.catalog.note_on, MessageCatalog::default().note_on);

        let wireless = config.wireless_options().unwrap();
        assert!(!wireless.connect.auto_reconnect);
        assert_eq!(wireless.service.to_string().to_uppercase(), MIDI_SERVICE_UUID);
    }

    #[test]
    fn test_validation_errors() {
        assert!(AppConfig::parse("output:\n  max_chunk_size: 4\n").is_err());
        assert!(AppConfig::parse("wireless:\n  service_uuid: nope\n").is_err());
        assert!(AppConfig::parse("client_name: \"  \"\n").is_err());
        assert!(AppConfig::parse("host:\n  port_filter: \"\"\n").is_err());
        assert!(AppConfig::parse("transport: carrier-pigeon\n").is_err());
        assert!(AppConfig::parse("wireless:\n  timestamp_step_ms: 8192\n").is_err());
        assert!(AppConfig::parse("wireless:\n  timestamp_step_ms: 8191\n").is_ok());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client_name: Studio\noutput:\n  buffer_limit: 16").unwrap();

        let config = AppConfig::load(file.path()).await.unwrap();
        assert_eq!(config.client_name, "Studio");
        assert_eq!(config.output.buffer_limit, 16);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        assert!(AppConfig::load(&path).await.is_err());
        assert_eq!(
            AppConfig::load_or_default(&path).await.unwrap(),
            AppConfig::default()
        );
    }
}
