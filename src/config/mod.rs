//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`PEERWIRE_*`)
//!
//! Every field has a default, so a file only needs the values it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PeerError, Result};
use crate::protocol::{DeliveryMethod, MessageParameters};
use crate::transport::DEFAULT_MAX_FRAME_SIZE;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Send defaults
    #[serde(default)]
    pub send: SendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PeerError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `PEERWIRE_*` environment variables on top of `self`.
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        // Connection settings
        if let Some(val) = env_parse("PEERWIRE_READ_TIMEOUT_MS") {
            self.connection.read_timeout_ms = val;
        }
        if let Some(val) = env_parse("PEERWIRE_DISCONNECT_DELAY_MS") {
            self.connection.disconnect_delay_ms = val;
        }
        if let Some(val) = env_parse("PEERWIRE_MAX_FRAME_SIZE") {
            self.connection.max_frame_size = val;
        }

        // Send settings
        if let Ok(method) = std::env::var("PEERWIRE_DELIVERY_METHOD") {
            if let Ok(method) = serde_json::from_value(serde_json::Value::String(method)) {
                self.send.delivery_method = method;
            }
        }
        if let Some(val) = env_parse("PEERWIRE_CHANNEL") {
            self.send.channel = val;
        }

        // Logging settings
        if let Ok(level) = std::env::var("PEERWIRE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(val) = env_parse("PEERWIRE_LOG_JSON") {
            self.logging.json = val;
        }

        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Read timeout in milliseconds (0 = wait indefinitely)
    pub read_timeout_ms: u64,

    /// Delay before a graceful disconnect, in milliseconds
    pub disconnect_delay_ms: u64,

    /// Maximum frame body size in bytes
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 0,
            disconnect_delay_ms: 0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Read timeout, `None` when reads wait indefinitely
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    /// Disconnect delay
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }
}

/// Default send parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Delivery method when none is given
    pub delivery_method: DeliveryMethod,

    /// Channel when none is given
    pub channel: u8,
}

impl SendConfig {
    /// Unencrypted parameters from these defaults
    pub fn message_parameters(&self) -> MessageParameters {
        MessageParameters::new(self.delivery_method).with_channel(self.channel)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.connection.read_timeout(), None);
        assert_eq!(config.send.delivery_method, DeliveryMethod::ReliableOrdered);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [connection]
            read_timeout_ms = 1500
            max_frame_size = 4096

            [send]
            delivery_method = "unreliable_sequenced"
            channel = 2

            [logging]
            level = "peerwire=debug"
            json = true
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.connection.read_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.connection.disconnect_delay_ms, 0);
        assert_eq!(config.connection.max_frame_size, 4096);

        let params = config.send.message_parameters();
        assert_eq!(params.delivery_method, DeliveryMethod::UnreliableSequenced);
        assert_eq!(params.channel, 2);
        assert!(!params.encrypted);
        assert!(config.logging.json);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\ndisconnect_delay_ms = 250").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.connection.disconnect_delay(),
            Duration::from_millis(250)
        );
        assert_eq!(config.send, SendConfig::default());
    }

    #[test]
    fn test_config_from_file_errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/peerwire.toml"),
            Err(PeerError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection\nbroken").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(PeerError::Config(_))
        ));
    }
}
