use std::io;
use thiserror::Error;

use crate::protocol::ptp::management::ManagementErrorId;

/// Errors produced while decoding or encoding PTP wire messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Buffer ended before a field could be read
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed
        needed: usize,
        /// Bytes actually available
        have: usize,
    },

    /// Version field does not match the configured protocol variant
    #[error("unsupported PTP version: {0}")]
    UnsupportedVersion(u8),

    /// Message type or control code is not one we understand
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// Declared length disagrees with the buffer or the protocol-mandated size
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        /// Length carried in the header (or required by the type)
        declared: usize,
        /// Length actually available
        actual: usize,
    },

    /// v1 integrity trailer did not match the computed CRC
    #[error("checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch {
        /// CRC computed over the received bytes
        expected: u32,
        /// CRC carried in the trailer
        actual: u32,
    },

    /// Raw frame was not a PTP (0x88F7) frame
    #[error("wrong ethertype: 0x{0:04X}")]
    WrongEthertype(u16),

    /// A field held a value outside its legal range
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

/// Errors from the network capability
#[derive(Debug, Error)]
pub enum NetError {
    /// Underlying socket error
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport was shut down
    #[error("transport closed")]
    Closed,
}

/// Errors from the clock capability
#[derive(Debug, Error)]
pub enum ClockError {
    /// Operation not available on this platform or clock
    #[error("clock operation not supported")]
    Unsupported,

    /// Caller lacks the privilege to adjust the clock
    #[error("permission denied adjusting clock")]
    PermissionDenied,

    /// Operating system rejected the call
    #[error("clock adjustment failed: {0}")]
    Os(#[source] io::Error),
}

/// Errors that can occur while running the PTP core
#[derive(Debug, Error)]
pub enum PtpError {
    /// Malformed or inconsistent message
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// Timestamp or `Follow_Up` without a matching buffered message
    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch {
        /// Sequence id we were waiting for
        expected: u16,
        /// Sequence id that arrived
        got: u16,
    },

    /// Foreign master table rejected an insert
    #[error("foreign master table full")]
    TableFull,

    /// Timer index does not name a timer
    #[error("timer index out of range: {0}")]
    TimerIndexOutOfRange(usize),

    /// Clock adjustment failed
    #[error("clock adjustment failed: {0}")]
    ClockAdjust(#[from] ClockError),

    /// Socket failure from the network layer
    #[error("socket failure: {0}")]
    Socket(#[from] NetError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Management request could not be honoured
    #[error("management error: {0:?}")]
    Management(ManagementErrorId),
}

impl PtpError {
    /// Whether this error must escalate the port to FAULTY.
    #[must_use]
    pub fn is_fatal_for_port(&self) -> bool {
        matches!(self, Self::Socket(_))
    }
}

/// Result alias for the PTP core
pub type Result<T> = std::result::Result<T, PtpError>;
