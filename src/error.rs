//! Error types for Spalink.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for Spalink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Spalink.
#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Connection errors
    #[error("connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: SocketAddr, reason: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("connection attempt already in progress")]
    ConnectInProgress,

    // Command guard errors
    #[error("spa state not yet known, wait for a status update")]
    StateUnknown,

    #[error("no such component port: {0}")]
    InvalidPort(u8),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Protocol parsing and framing errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    ChecksumMismatch { expected: u8, got: u8 },

    #[error("truncated message: need {needed} bytes, got {got}")]
    TruncatedMessage { needed: usize, got: usize },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

impl Error {
    /// Check if this error means the caller should wait for a status update
    /// before retrying the intent.
    pub fn is_state_unknown(&self) -> bool {
        matches!(self, Error::StateUnknown)
    }

    /// Check if this error represents a failed or timed-out connection
    /// attempt (retryable by issuing another command).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionClosed
                | Error::ConnectionTimeout
                | Error::Io(_)
        )
    }
}
