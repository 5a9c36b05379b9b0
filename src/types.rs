//! Core types used throughout Spalink.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Temperature scale the board is configured for.
///
/// Celsius boards report temperatures doubled on the wire to preserve
/// half-degree resolution; Fahrenheit boards report degrees as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureScale {
    Fahrenheit,
    Celsius,
}

impl fmt::Display for TemperatureScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fahrenheit => write!(f, "°F"),
            Self::Celsius => write!(f, "°C"),
        }
    }
}

/// Operating band for the target temperature.
///
/// Each range has its own valid setpoint window; switching range is a
/// toggle command on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureRange {
    High,
    Low,
}

impl fmt::Display for TemperatureRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Heater scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaterMode {
    /// Heater may run whenever the water is below the setpoint.
    Ready,
    /// Heating suppressed except during filter cycles.
    Rest,
    /// Scheduled mix of the two.
    ReadyRest,
}

impl HeaterMode {
    /// Decode from the two low bits of the status flags byte.
    ///
    /// Any value outside the documented set defaults to READY.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => Self::Rest,
            3 => Self::ReadyRest,
            _ => Self::Ready,
        }
    }
}

impl fmt::Display for HeaterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Rest => write!(f, "rest"),
            Self::ReadyRest => write!(f, "ready_rest"),
        }
    }
}

/// Kind of controllable or observable spa subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Pump,
    Blower,
    Light,
    Heater,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pump => write!(f, "pump"),
            Self::Blower => write!(f, "blower"),
            Self::Light => write!(f, "light"),
            Self::Heater => write!(f, "heater"),
        }
    }
}

/// Reported level of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentValue {
    Off,
    Low,
    Medium,
    High,
    On,
}

impl ComponentValue {
    /// Whether the component is running at any level.
    pub fn is_on(self) -> bool {
        self != Self::Off
    }
}

impl fmt::Display for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::On => write!(f, "on"),
        }
    }
}

/// A single spa subsystem as reported by a status snapshot.
///
/// Pumps occupy fixed ports 0–3; blower and light are singletons on port 0;
/// the heater has no port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub component_type: ComponentType,
    pub port: Option<u8>,
    pub value: ComponentValue,
}

impl Component {
    pub fn new(component_type: ComponentType, port: Option<u8>, value: ComponentValue) -> Self {
        Self {
            component_type,
            port,
            value,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}{}={}", self.component_type, port, self.value),
            None => write!(f, "{}={}", self.component_type, self.value),
        }
    }
}

/// Connection state, owned exclusively by the client's connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket; the idle default.
    Disconnected,
    /// TCP connect in flight. Concurrent connect attempts are rejected.
    Connecting,
    /// Socket live, frames flowing.
    Connected,
}

impl ConnectionState {
    pub fn is_established(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}
