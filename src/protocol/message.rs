//! Inbound message decoding.
//!
//! Two frame types are understood: the status snapshot (`FF AF 13`) and
//! the configuration response (`0A BF 94`). Anything else passes through
//! as unknown and is ignored upstream.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::{frame::RawFrame, CONFIG_TAG, STATUS_TAG};
use crate::error::ProtocolError;
use crate::types::{
    Component, ComponentType, ComponentValue, HeaterMode, TemperatureRange, TemperatureScale,
};

/// Valid setpoint window in the HIGH temperature range, °C.
pub const HIGH_RANGE_WINDOW_C: RangeInclusive<f64> = 10.0..=40.0;

/// Valid setpoint window in the LOW temperature range, °C.
pub const LOW_RANGE_WINDOW_C: RangeInclusive<f64> = 10.0..=30.0;

/// Bytes required in a status body (offsets run up to the target
/// temperature at index 23).
const STATUS_MIN_LEN: usize = 24;

/// Bytes required in a configuration payload.
const CONFIG_MIN_LEN: usize = 9;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Status(StatusMessage),
    Config(ConfigMessage),
}

impl Message {
    /// Decode a verified frame into a message.
    ///
    /// Returns `Ok(None)` for frame types this client does not understand;
    /// the board emits several beyond the two decoded here.
    pub fn parse(frame: &RawFrame) -> Result<Option<Self>, ProtocolError> {
        let body = frame.body();
        if body.starts_with(&STATUS_TAG) {
            StatusMessage::parse(body).map(|status| Some(Self::Status(status)))
        } else if body.starts_with(&CONFIG_TAG) {
            ConfigMessage::parse(&body[3..]).map(|config| Some(Self::Config(config)))
        } else {
            Ok(None)
        }
    }
}

/// Full device snapshot decoded from a status frame.
///
/// The component list always contains exactly four pumps (ports 0–3), one
/// blower, one light, and the heater, regardless of what hardware is
/// physically present; presence is resolved separately via
/// [`ConfigMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Measured water temperature, in the board's scale.
    pub current_temperature: f64,
    /// Target (setpoint) temperature, in the board's scale.
    pub target_temperature: f64,
    pub scale: TemperatureScale,
    pub range: TemperatureRange,
    pub heater_mode: HeaterMode,
    /// Whether the heater element is actively heating.
    pub heating: bool,
    /// Whether the topside panel is locked.
    pub panel_locked: bool,
    /// Panel clock, 24-hour.
    pub hour: u8,
    pub minute: u8,
    pub components: Vec<Component>,
}

impl StatusMessage {
    /// Decode a status body starting at the `FF` tag byte.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < STATUS_MIN_LEN {
            return Err(ProtocolError::TruncatedMessage {
                needed: STATUS_MIN_LEN,
                got: data.len(),
            });
        }

        let scale = if data[12] & 0x01 == 0 {
            TemperatureScale::Fahrenheit
        } else {
            TemperatureScale::Celsius
        };
        let range = if data[13] & 0x04 != 0 {
            TemperatureRange::High
        } else {
            TemperatureRange::Low
        };
        let heating = data[13] & 0x30 != 0;

        // Celsius boards double both temperatures on the wire.
        let divisor = match scale {
            TemperatureScale::Celsius => 2.0,
            TemperatureScale::Fahrenheit => 1.0,
        };
        let current_temperature = f64::from(data[5]) / divisor;
        let target_temperature = f64::from(data[23]) / divisor;

        let mut components = Vec::with_capacity(7);

        // Four pump ports, two bits each: 0=off, 1=low, 2=high. The value 3
        // is undefined and treated as off.
        for port in 0..4u8 {
            let value = match (data[14] >> (port * 2)) & 0x03 {
                1 => ComponentValue::Low,
                2 => ComponentValue::High,
                _ => ComponentValue::Off,
            };
            components.push(Component::new(ComponentType::Pump, Some(port), value));
        }

        let blower = match (data[16] >> 2) & 0x03 {
            1 => ComponentValue::Low,
            2 => ComponentValue::Medium,
            3 => ComponentValue::High,
            _ => ComponentValue::Off,
        };
        components.push(Component::new(ComponentType::Blower, Some(0), blower));

        let light = if data[17] & 0x03 != 0 {
            ComponentValue::High
        } else {
            ComponentValue::Off
        };
        components.push(Component::new(ComponentType::Light, Some(0), light));

        let heater = if heating {
            ComponentValue::On
        } else {
            ComponentValue::Off
        };
        components.push(Component::new(ComponentType::Heater, None, heater));

        Ok(Self {
            current_temperature,
            target_temperature,
            scale,
            range,
            heater_mode: HeaterMode::from_bits(data[8]),
            heating,
            panel_locked: data[11] & 0x10 != 0,
            hour: data[6],
            minute: data[7],
            components,
        })
    }

    /// Look up a component by type and port.
    pub fn component(&self, component_type: ComponentType, port: Option<u8>) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.component_type == component_type && c.port == port)
    }

    /// Whether the pump on the given port is running at any speed.
    pub fn pump_on(&self, port: u8) -> bool {
        self.component(ComponentType::Pump, Some(port))
            .is_some_and(|c| c.value.is_on())
    }

    /// Whether the light is on.
    pub fn light_on(&self) -> bool {
        self.component(ComponentType::Light, Some(0))
            .is_some_and(|c| c.value.is_on())
    }

    /// Whether the blower is running at any speed.
    pub fn blower_on(&self) -> bool {
        self.component(ComponentType::Blower, Some(0))
            .is_some_and(|c| c.value.is_on())
    }

    /// Valid setpoint window for the active temperature range, °C.
    pub fn setpoint_window(&self) -> RangeInclusive<f64> {
        match self.range {
            TemperatureRange::High => HIGH_RANGE_WINDOW_C,
            TemperatureRange::Low => LOW_RANGE_WINDOW_C,
        }
    }
}

/// Component presence flags decoded from a configuration response.
///
/// Only pumps 1–2 are reported: the configuration bits for slots 3–6 do
/// not reliably distinguish pumps from other auxiliary outputs, so those
/// slots are always reported absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMessage {
    /// Presence of pumps 1–6 (indices 0–5); indices 2–5 are always false.
    pub pumps: [bool; 6],
    /// Presence of lights 1–2.
    pub lights: [bool; 2],
    pub blower: bool,
    /// Presence of auxiliary outputs 1–2.
    pub aux: [bool; 2],
    pub mister: bool,
}

impl ConfigMessage {
    /// Decode a configuration payload (bytes after the 5-byte tag and
    /// address prefix).
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CONFIG_MIN_LEN {
            return Err(ProtocolError::TruncatedMessage {
                needed: CONFIG_MIN_LEN,
                got: data.len(),
            });
        }

        Ok(Self {
            pumps: [
                data[4] & 0x03 != 0,
                data[4] & 0x0c != 0,
                false,
                false,
                false,
                false,
            ],
            lights: [data[6] & 0x03 != 0, data[6] & 0x0c != 0],
            blower: data[7] & 0x0c != 0,
            aux: [data[8] & 0x01 != 0, data[8] & 0x02 != 0],
            mister: data[8] & 0x10 != 0,
        })
    }
}
