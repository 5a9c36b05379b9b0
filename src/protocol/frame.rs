//! Frame extraction and serialization.
//!
//! [`FrameCodec`] turns the raw TCP byte stream into delimited
//! [`RawFrame`]s and serializes outbound [`Command`]s. Partial frames are
//! retained in the decode buffer across reads, so frames split over chunk
//! boundaries survive intact.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use super::{
    command::Command, crc::crc8, ADDRESS, COMMAND_OVERHEAD, DELIMITER, MAX_PAYLOAD_SIZE,
    MIN_LENGTH_FIELD,
};
use crate::error::ProtocolError;

/// A complete delimited frame as it appeared on the wire.
///
/// Invariant: `data.len() == data[1] + 2`, the first and last bytes are
/// `0x7E`, and the CRC has been verified by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Bytes,
}

impl RawFrame {
    pub(crate) fn new(data: Bytes) -> Self {
        debug_assert!(data.len() >= 4);
        debug_assert_eq!(data.len(), usize::from(data[1]) + 2);
        Self { data }
    }

    /// The full frame including both delimiters.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Value of the length field.
    pub fn length_field(&self) -> u8 {
        self.data[1]
    }

    /// Frame body: type tag through last payload byte, excluding the
    /// delimiters, length byte, and CRC.
    pub fn body(&self) -> &[u8] {
        &self.data[2..self.data.len() - 2]
    }

    /// First body byte, used for coarse frame identification.
    pub fn message_type(&self) -> u8 {
        self.data[2]
    }

    /// CRC byte carried by the frame.
    pub fn crc(&self) -> u8 {
        self.data[self.data.len() - 2]
    }

    /// Verify the carried CRC against the length byte through the last
    /// body byte.
    pub fn verify_crc(&self) -> Result<(), ProtocolError> {
        let computed = crc8(&self.data[1..self.data.len() - 2]);
        let carried = self.crc();
        if computed == carried {
            Ok(())
        } else {
            Err(ProtocolError::ChecksumMismatch {
                expected: computed,
                got: carried,
            })
        }
    }
}

/// Codec for Balboa frames over a byte stream.
///
/// Decoding scans for `0x7E`, reads the length field, and waits for the
/// complete frame before yielding it. Noise between frames is skipped one
/// byte at a time; frames with a bad trailing delimiter or failing CRC are
/// discarded with a log line rather than terminating the stream. A
/// corrupted length byte can desynchronize scanning until the next valid
/// delimiter; the CRC check keeps mis-framed data from being decoded as a
/// message.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = crate::Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            // Scan to the next delimiter candidate, dropping leading noise.
            let Some(start) = src.iter().position(|&b| b == DELIMITER) else {
                src.clear();
                return Ok(None);
            };
            if start > 0 {
                src.advance(start);
            }

            // Need the length byte to size the frame.
            if src.len() < 2 {
                return Ok(None);
            }

            let length_field = src[1];
            if length_field < MIN_LENGTH_FIELD {
                // Not a parseable frame at this delimiter; skip one byte.
                src.advance(1);
                continue;
            }

            let total = usize::from(length_field) + 2;
            if src.len() < total {
                // Partial frame: keep the bytes and wait for the next chunk.
                src.reserve(total - src.len());
                return Ok(None);
            }

            if src[total - 1] != DELIMITER {
                trace!(
                    "delimiter candidate without trailing delimiter at offset {}",
                    total - 1
                );
                src.advance(1);
                continue;
            }

            let frame = RawFrame::new(src.split_to(total).freeze());
            if let Err(e) = frame.verify_crc() {
                warn!("discarding frame with bad CRC: {e} ({})", hex::encode(frame.bytes()));
                continue;
            }

            return Ok(Some(frame));
        }
    }

    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // A partial frame at stream end is unrecoverable noise, not
                // an error.
                if !src.is_empty() {
                    trace!("discarding {} trailing bytes at stream end", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Command> for FrameCodec {
    type Error = crate::Error;

    fn encode(
        &mut self,
        command: Command,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), Self::Error> {
        let payload = command.payload();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        let length_field = payload.len() + COMMAND_OVERHEAD;
        dst.reserve(length_field + 2);

        let start = dst.len();
        dst.put_u8(DELIMITER);
        dst.put_u8(length_field as u8);
        dst.put_slice(&ADDRESS);
        dst.put_u8(command.message_type());
        dst.put_slice(&payload);

        // CRC covers the length byte through the last payload byte.
        let crc = crc8(&dst[start + 1..]);
        dst.put_u8(crc);
        dst.put_u8(DELIMITER);

        Ok(())
    }
}
