//! Configuration management for Spalink.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::DEFAULT_PORT;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Client connection lifecycle configuration.
    #[serde(default)]
    pub client: ClientConfig,

    /// Discovery scan configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.client.port == 0 {
            return Err(Error::Config("client port must be non-zero".into()));
        }
        if self.discovery.concurrency == 0 {
            return Err(Error::Config(
                "discovery concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "spalink", "spalink").map_or_else(
            || PathBuf::from("spalink.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Connection lifecycle timing for a [`crate::SpaClient`].
///
/// The defaults match the board's expectations; tests shrink them to keep
/// the suite fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TCP port of the control interface.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a connection attempt may take before `ensure_connected`
    /// fails.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Window after a command send during which idle-disconnect is
    /// suppressed. Time-based; the protocol has no acknowledgements.
    #[serde(default = "default_command_guard", with = "humantime_serde")]
    pub command_guard: Duration,

    /// Delay from the first unguarded status/config receipt to the
    /// energy-saving disconnect.
    #[serde(default = "default_idle_disconnect_delay", with = "humantime_serde")]
    pub idle_disconnect_delay: Duration,

    /// Grace period between the half-close and forcibly dropping the
    /// socket on disconnect.
    #[serde(default = "default_disconnect_grace", with = "humantime_serde")]
    pub disconnect_grace: Duration,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            command_guard: default_command_guard(),
            idle_disconnect_delay: default_idle_disconnect_delay(),
            disconnect_grace: default_disconnect_grace(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Subnet sweep configuration for [`crate::discovery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// TCP port probed on each candidate host.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Overall scan deadline; probes still outstanding when it elapses are
    /// abandoned.
    #[serde(default = "default_overall_timeout", with = "humantime_serde")]
    pub overall_timeout: Duration,

    /// Per-host connect timeout, capped by the overall deadline.
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Maximum concurrent probes, bounding file-descriptor use.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            overall_timeout: default_overall_timeout(),
            probe_timeout: default_probe_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// ANSI color in pretty output.
    #[serde(default = "default_log_color")]
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_log_color(),
        }
    }
}

/// Initialize the tracing subscriber from a logging configuration.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_guard() -> Duration {
    Duration::from_secs(2)
}

fn default_idle_disconnect_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_disconnect_grace() -> Duration {
    Duration::from_millis(500)
}

fn default_event_capacity() -> usize {
    64
}

fn default_overall_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_concurrency() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_color() -> bool {
    true
}
