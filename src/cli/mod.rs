//! CLI interface for Spalink.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Spalink - local-network client for Balboa spa control boards
#[derive(Parser, Debug)]
#[command(
    name = "spalink",
    author,
    version,
    about = "Local-network client for Balboa spa control boards",
    long_about = r#"
Spalink talks the Balboa local control protocol (TCP port 4257) directly
to the spa board on your network: no cloud account, no vendor app.

QUICK START:
  Find spas:      spalink discover
  Live status:    spalink watch 192.168.1.50
  Set 38.5 °C:    spalink set 192.168.1.50 temp 38.5
  Jets on:        spalink set 192.168.1.50 jet 0 on
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the local subnets for spa boards
    Discover(DiscoverArgs),

    /// Connect to a board and stream decoded status updates
    Watch(WatchArgs),

    /// Change a setting on the board
    Set(SetArgs),
}

/// Discover command arguments
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Overall scan timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,

    /// Maximum concurrent probes
    #[arg(long, default_value_t = 64)]
    pub concurrency: usize,
}

/// Watch command arguments
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Board address
    pub host: IpAddr,

    /// Control port
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,
}

/// Set command arguments
#[derive(Args, Debug)]
pub struct SetArgs {
    /// Board address
    pub host: IpAddr,

    /// Control port
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// How long to wait for the baseline status, in seconds
    #[arg(long, default_value_t = 10)]
    pub wait: u64,

    #[command(subcommand)]
    pub setting: Setting,
}

/// Settings reachable from the command line
#[derive(Subcommand, Debug)]
pub enum Setting {
    /// Target temperature in degrees Celsius
    Temp { celsius: f64 },

    /// Jet pump on a port (0-3)
    Jet { port: u8, state: OnOff },

    /// The light
    Light { state: OnOff },

    /// The air blower
    Blower { state: OnOff },

    /// Heater mode
    HeaterMode { mode: CliHeaterMode },

    /// Temperature range
    TempRange { range: CliTempRange },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CliHeaterMode {
    Ready,
    Rest,
}

impl From<CliHeaterMode> for crate::types::HeaterMode {
    fn from(mode: CliHeaterMode) -> Self {
        match mode {
            CliHeaterMode::Ready => Self::Ready,
            CliHeaterMode::Rest => Self::Rest,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CliTempRange {
    High,
    Low,
}

impl From<CliTempRange> for crate::types::TemperatureRange {
    fn from(range: CliTempRange) -> Self {
        match range {
            CliTempRange::High => Self::High,
            CliTempRange::Low => Self::Low,
        }
    }
}
