//! # Spalink
//!
//! Local-network client for Balboa spa control boards.
//!
//! Balboa boards expose a binary, frame-based control protocol on TCP port
//! 4257. Spalink implements the full local engine: delimiter framing with
//! CRC-8 validation, bitfield decoding of status and configuration
//! snapshots, toggle-style command construction, and an energy-saving
//! connection lifecycle that connects on demand and drops the socket a few
//! seconds after each exchange so the embedded controller is not kept busy.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Consumer (driver / automation)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │   SpaClient — connection lifecycle, command guards, events  │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Message Parser (status/cfg) │  Command catalogue (toggles) │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │           Frame Codec (0x7E framing + CRC-8 check)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     TCP transport (tokio)                   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! Discovery is a sibling concern: [`discovery::discover`] sweeps the local
//! /24 subnets for anything answering on the control port.

#![warn(clippy::all, clippy::pedantic)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]                // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]    // Intentional byte-level arithmetic
#![allow(clippy::cast_sign_loss)]              // Temperature rounding is bounded
#![allow(clippy::unreadable_literal)]          // Wire constants are clearer unseparated
#![allow(clippy::future_not_send)]             // Async internals

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use client::{SpaClient, SpaEvent};
pub use config::{ClientConfig, Config, DiscoveryConfig};
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TCP port Balboa boards listen on for local control.
pub const DEFAULT_PORT: u16 = 4257;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{SpaClient, SpaEvent};
    pub use crate::config::{ClientConfig, Config, DiscoveryConfig};
    pub use crate::discovery::discover;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Command, ConfigMessage, Message, StatusMessage, ToggleItem};
    pub use crate::types::*;
}
