//! Wire protocol for Balboa local control.
//!
//! Defines the frame format, CRC, message decoding, and the command
//! catalogue.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────┬─────┬──────────────────────────────┬─────┬──────┐
//! │ 0x7E │ LEN │ BODY (LEN - 2 bytes)         │ CRC │ 0x7E │
//! └──────┴─────┴──────────────────────────────┴─────┴──────┘
//! ```
//!
//! `LEN` counts everything from the length byte through the CRC byte, so a
//! complete frame is `LEN + 2` bytes including both delimiters. The CRC-8
//! covers the length byte through the last body byte.
//!
//! Inbound frames are identified by the first three body bytes:
//! `FF AF 13` is a status snapshot, `0A BF 94` a configuration response.
//! Outbound frames always carry the `0A BF` address followed by a command
//! type byte and its payload.

mod command;
mod crc;
mod frame;
mod message;

pub use command::{Command, ToggleItem};
pub use crc::crc8;
pub use frame::{FrameCodec, RawFrame};
pub use message::{
    ConfigMessage, Message, StatusMessage, HIGH_RANGE_WINDOW_C, LOW_RANGE_WINDOW_C,
};

/// Frame delimiter byte.
pub const DELIMITER: u8 = 0x7E;

/// Address prefix carried by every outbound command frame.
pub const ADDRESS: [u8; 2] = [0x0A, 0xBF];

/// Body tag of a status snapshot.
pub const STATUS_TAG: [u8; 3] = [0xFF, 0xAF, 0x13];

/// Body tag of a configuration response.
pub const CONFIG_TAG: [u8; 3] = [0x0A, 0xBF, 0x94];

/// Bytes of frame overhead around a command payload:
/// length byte, two address bytes, type byte, and CRC.
pub const COMMAND_OVERHEAD: usize = 5;

/// Maximum command payload representable in the one-byte length field.
pub const MAX_PAYLOAD_SIZE: usize = 0xFF - COMMAND_OVERHEAD;

/// Smallest value of the length field that can describe a frame
/// (length byte plus CRC, empty body).
pub const MIN_LENGTH_FIELD: u8 = 2;
