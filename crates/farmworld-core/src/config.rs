//! Configuration loading and typed config structures for the `FarmWorld`
//! server.
//!
//! The canonical configuration lives in `farmworld-config.yaml` next to the
//! server binary. Every field has a default, so a missing file or a partial
//! file both yield a runnable configuration. Values that would make the
//! tick loop or the fishing scheduler misbehave are rejected by
//! [`ServerConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `farmworld-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Listener and tick cadence.
    #[serde(default)]
    pub server: NetworkConfig,

    /// Simulation time origin and checkpointing.
    #[serde(default)]
    pub time: TimeConfig,

    /// Fishing bite delays.
    #[serde(default)]
    pub fishing: FishingConfig,

    /// World randomness.
    #[serde(default)]
    pub world: WorldConfig,

    /// Developer-only features.
    #[serde(default)]
    pub developer: DeveloperConfig,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_file`] when the file exists.
    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.infrastructure.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.ticks_per_second == 0 || self.server.ticks_per_second > 1_000 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "server.ticks_per_second must be 1..=1000, got {}",
                    self.server.ticks_per_second
                ),
            });
        }
        if self.server.transform_broadcast_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.transform_broadcast_interval_ticks must be at least 1".to_owned(),
            });
        }
        if self.fishing.min_bite_delay_ms > self.fishing.max_bite_delay_ms {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "fishing.min_bite_delay_ms ({}) exceeds max_bite_delay_ms ({})",
                    self.fishing.min_bite_delay_ms, self.fishing.max_bite_delay_ms
                ),
            });
        }
        if self.time.checkpoint_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "time.checkpoint_interval_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Listener and tick cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port for client connections.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Simulation ticks per wall-clock second.
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,

    /// Broadcast player transforms every N ticks.
    #[serde(default = "default_transform_broadcast_interval_ticks")]
    pub transform_broadcast_interval_ticks: u64,

    /// Maximum simultaneous client connections.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl NetworkConfig {
    /// Wall-clock duration of one tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1_000)
            .checked_div(self.ticks_per_second)
            .unwrap_or(Duration::from_millis(100))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ticks_per_second: default_ticks_per_second(),
            transform_broadcast_interval_ticks: default_transform_broadcast_interval_ticks(),
            max_clients: default_max_clients(),
        }
    }
}

/// Simulation time origin and checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Simulation time to start from when no checkpoint is stored.
    #[serde(default)]
    pub start_time_ms: u64,

    /// Persist the clock every N milliseconds of simulation time.
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_time_ms: 0,
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
        }
    }
}

/// Fishing bite delays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FishingConfig {
    /// Shortest wait before a fish bites.
    #[serde(default = "default_min_bite_delay_ms")]
    pub min_bite_delay_ms: u64,

    /// Longest wait before a fish bites.
    #[serde(default = "default_max_bite_delay_ms")]
    pub max_bite_delay_ms: u64,
}

impl Default for FishingConfig {
    fn default() -> Self {
        Self {
            min_bite_delay_ms: default_min_bite_delay_ms(),
            max_bite_delay_ms: default_max_bite_delay_ms(),
        }
    }
}

/// World randomness.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Seed for the server's random number generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

/// Developer-only features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeveloperConfig {
    /// Accept `DeveloperPlaceMinableObject`, which trusts client quantities.
    #[serde(default)]
    pub allow_developer_placement: bool,
}

/// Infrastructure connection strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,
}

impl InfrastructureConfig {
    /// Override infrastructure URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: default_dragonfly_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    9050
}

const fn default_ticks_per_second() -> u32 {
    10
}

const fn default_transform_broadcast_interval_ticks() -> u64 {
    1
}

const fn default_max_clients() -> usize {
    10
}

const fn default_checkpoint_interval_ms() -> u64 {
    crate::clock::DEFAULT_CHECKPOINT_INTERVAL_MS
}

const fn default_min_bite_delay_ms() -> u64 {
    3_000
}

const fn default_max_bite_delay_ms() -> u64 {
    15_000
}

const fn default_seed() -> u64 {
    42
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 9050);
        assert_eq!(config.server.ticks_per_second, 10);
        assert_eq!(config.server.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.fishing.min_bite_delay_ms, 3_000);
        assert_eq!(config.fishing.max_bite_delay_ms, 15_000);
        assert_eq!(config.time.checkpoint_interval_ms, 5_000);
        assert!(!config.developer.allow_developer_placement);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
server:
  host: 127.0.0.1
  port: 9100
  ticks_per_second: 20
  transform_broadcast_interval_ticks: 2
  max_clients: 64

time:
  start_time_ms: 123456
  checkpoint_interval_ms: 1000

fishing:
  min_bite_delay_ms: 100
  max_bite_delay_ms: 200

world:
  seed: 7

developer:
  allow_developer_placement: true

logging:
  level: debug
  json: true
";
        let config = ServerConfig::parse(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.server.transform_broadcast_interval_ticks, 2);
        assert_eq!(config.server.max_clients, 64);
        assert_eq!(config.time.start_time_ms, 123_456);
        assert_eq!(config.fishing.max_bite_delay_ms, 200);
        assert_eq!(config.world.seed, 7);
        assert!(config.developer.allow_developer_placement);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config = ServerConfig::parse("world:\n  seed: 1\n").unwrap();
        assert_eq!(config.world.seed, 1);
        assert_eq!(config.server.port, 9050);
    }

    #[test]
    fn zero_tick_rate_is_invalid() {
        let err = ServerConfig::parse("server:\n  ticks_per_second: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn inverted_bite_delays_are_invalid() {
        let yaml = "fishing:\n  min_bite_delay_ms: 5000\n  max_bite_delay_ms: 1000\n";
        assert!(matches!(
            ServerConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            ServerConfig::from_file_or_default(Path::new("/nonexistent/farmworld.yaml")).unwrap();
        assert_eq!(config.server.port, 9050);
    }
}
