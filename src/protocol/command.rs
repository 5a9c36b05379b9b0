//! Protocol command catalogue.
//!
//! The board exposes no direct "set" operations for its outputs; pumps,
//! lights, blower, heater mode, and temperature range are all driven by
//! toggle commands. Deciding whether a toggle is needed is the client's
//! job; this module only knows the wire encoding.

use crate::types::TemperatureScale;

/// Toggleable items addressed by the `0x11` toggle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleItem {
    /// Jet pump on port 0–3.
    Pump(u8),
    /// The single light output.
    Light,
    /// The air blower.
    Blower,
    /// Heater mode (READY / REST cycle).
    HeatMode,
    /// Temperature range (HIGH / LOW band).
    TempRange,
}

impl ToggleItem {
    /// Item code carried in the toggle payload.
    pub fn code(self) -> u8 {
        match self {
            Self::Pump(port) => 0x04 + port,
            Self::Light => 0x11,
            Self::Blower => 0x0c,
            Self::HeatMode => 0x51,
            Self::TempRange => 0x50,
        }
    }
}

/// A protocol-level command, ready for frame encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a configuration response (`0A BF 94`).
    ConfigRequest,
    /// Toggle one of the board's outputs.
    Toggle(ToggleItem),
    /// Set the target temperature to a raw wire value.
    SetTemperature(u8),
    /// Arbitrary command type and payload, for operations outside the
    /// catalogue above.
    Raw { message_type: u8, payload: Vec<u8> },
}

impl Command {
    /// Build an arbitrary command from its type byte and payload.
    pub fn raw(message_type: u8, payload: Vec<u8>) -> Self {
        Self::Raw {
            message_type,
            payload,
        }
    }

    /// Command type byte following the address prefix.
    pub fn message_type(&self) -> u8 {
        match self {
            Self::ConfigRequest => 0x04,
            Self::Toggle(_) => 0x11,
            Self::SetTemperature(_) => 0x20,
            Self::Raw { message_type, .. } => *message_type,
        }
    }

    /// Command payload bytes.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::ConfigRequest => Vec::new(),
            Self::Toggle(item) => vec![item.code(), 0x00],
            Self::SetTemperature(raw) => vec![*raw],
            Self::Raw { payload, .. } => payload.clone(),
        }
    }

    /// Build a set-temperature command from degrees Celsius.
    ///
    /// Celsius boards expect the setpoint doubled (half-degree resolution);
    /// Fahrenheit boards expect whole degrees Fahrenheit.
    pub fn set_temperature(celsius: f64, scale: TemperatureScale) -> Self {
        let raw = match scale {
            TemperatureScale::Celsius => (celsius * 2.0).round(),
            TemperatureScale::Fahrenheit => (celsius * 9.0 / 5.0 + 32.0).round(),
        };
        Self::SetTemperature(raw.clamp(0.0, 255.0) as u8)
    }
}
