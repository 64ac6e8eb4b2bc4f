//! Server configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! (or missing) file yields a runnable local server. Command-line flags in the
//! binary override the file.

use crate::error::ConfigError;
use crate::hub::DEFAULT_INBOX_CAPACITY;
use serde::{Deserialize, Serialize};
use shared::clock::DEFAULT_INCREMENT_MINUTES;
use shared::{PlayerId, MAX_MESSAGE_SIZE};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Map new players are placed on when they have no stored position
    pub spawn_map: String,
    pub connection: ConnectionConfig,
    pub clock: ClockConfig,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            spawn_map: "village".to_string(),
            connection: ConnectionConfig::default(),
            clock: ClockConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Per-connection limits and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub outbound_queue: usize,
    pub event_queue: usize,
    /// Hub inbox for sends, membership changes and queries
    pub hub_queue: usize,
    pub write_wait_ms: u64,
    pub pong_wait_ms: u64,
    pub ping_period_ms: u64,
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            event_queue: 256,
            hub_queue: DEFAULT_INBOX_CAPACITY,
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            // 9/10 of the pong wait so a probe always lands before the read deadline
            ping_period_ms: 54_000,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ConnectionConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_interval_ms: u64,
    pub increment_minutes: u8,
    /// Where the clock snapshot is persisted between runs, if anywhere
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            increment_minutes: DEFAULT_INCREMENT_MINUTES,
            snapshot_path: None,
        }
    }
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Connection token -> player identity
    pub tokens: HashMap<String, PlayerId>,
}

impl ServerConfig {
    /// Reads the config file if given, falling back to defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let increment = self.clock.increment_minutes;
        // Minutes stay on the ten-minute grid
        if increment == 0 || DEFAULT_INCREMENT_MINUTES % increment != 0 {
            return Err(ConfigError::Invalid(format!(
                "clock.increment_minutes must divide {}, got {}",
                DEFAULT_INCREMENT_MINUTES, increment
            )));
        }

        if self.clock.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "clock.tick_interval_ms must be positive".to_string(),
            ));
        }

        if self.connection.outbound_queue == 0
            || self.connection.event_queue == 0
            || self.connection.hub_queue == 0
        {
            return Err(ConfigError::Invalid(
                "queue capacities must be positive".to_string(),
            ));
        }

        if self.connection.ping_period_ms >= self.connection.pong_wait_ms {
            return Err(ConfigError::Invalid(
                "connection.ping_period_ms must be shorter than pong_wait_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.connection.outbound_queue, 256);
        assert_eq!(config.connection.hub_queue, 4096);
        assert_eq!(config.connection.write_wait(), Duration::from_secs(10));
        assert_eq!(config.connection.pong_wait(), Duration::from_secs(60));
        assert_eq!(config.connection.ping_period(), Duration::from_secs(54));
        assert_eq!(config.clock.tick_interval(), Duration::from_secs(10));
        assert_eq!(config.clock.increment_minutes, 10);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            port = 9100

            [clock]
            increment_minutes = 5

            [auth.tokens]
            "secret-a" = "6f1c3f4e-8d7a-4c21-9b0e-2f9d3f0c1a11"
        "#;

        let config = ServerConfig::from_toml(text).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.clock.increment_minutes, 5);
        assert_eq!(config.clock.tick_interval_ms, 10_000);
        assert_eq!(config.auth.tokens.len(), 1);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_invalid_increment() {
        let mut config = ServerConfig::default();
        config.clock.increment_minutes = 7;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.clock.increment_minutes = 0;
        assert_err!(config.validate());

        for off_grid in [15, 20, 30] {
            config.clock.increment_minutes = off_grid;
            assert_err!(config.validate());
        }

        for on_grid in [1, 2, 5, 10] {
            config.clock.increment_minutes = on_grid;
            assert_ok!(config.validate());
        }
    }

    #[test]
    fn test_invalid_ping_period() {
        let mut config = ServerConfig::default();
        config.connection.ping_period_ms = config.connection.pong_wait_ms;
        assert_err!(config.validate());
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::load(Some(Path::new("/nonexistent/valley.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            ServerConfig::from_toml("port = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
