//! Error types for tikapi
//!
//! Provides a unified error type for all operations, plus the framing-level
//! [`ProtocolError`] and the device-reported [`DeviceError`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias using ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Unified error type for tikapi operations
#[derive(Debug, Error)]
pub enum ApiError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    // -------------------------------------------------------------------------
    // Framing Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Device error: {0}")]
    Device(DeviceError),

    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether this error leaves the connection unusable.
    ///
    /// `Timeout` and `Device` are local to one request; everything that
    /// touches the socket or the byte stream alignment ends the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            ApiError::Io(_)
            | ApiError::ConnectionClosed(_)
            | ApiError::Protocol(_)
            | ApiError::AuthenticationFailed(_) => true,
            ApiError::Timeout
            | ApiError::Device(_)
            | ApiError::InvalidState { .. }
            | ApiError::InvalidCommand(_)
            | ApiError::Config(_) => false,
        }
    }

    /// Classify a socket error the same way for every read and write path.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            // Unix reports an expired SO_RCVTIMEO as WouldBlock, Windows as TimedOut
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ApiError::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ApiError::ConnectionClosed(err.to_string()),
            _ => ApiError::Io(err),
        }
    }
}

/// Framing-level failures. Any of these means the byte stream can no
/// longer be trusted to be aligned on word boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("truncated frame: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    #[error("invalid length prefix byte 0x{0:02x}")]
    InvalidLengthPrefix(u8),

    #[error("word too long: {len} bytes (max {max})")]
    WordTooLong { len: u64, max: u64 },

    #[error("invalid UTF-8 in protocol text")]
    InvalidUtf8,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Error detail carried by a `!trap` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceError {
    /// Human readable text from `=message=`
    pub message: String,

    /// Numeric category from `=category=`, when the device sends one
    pub category: Option<u32>,

    /// Every attribute of the trap sentence, `message` and `category` included
    pub attributes: BTreeMap<String, String>,
}

impl DeviceError {
    /// Build from the attributes of a `!trap` sentence
    pub fn from_attributes(attributes: BTreeMap<String, String>) -> Self {
        let message = attributes
            .get("message")
            .cloned()
            .unwrap_or_else(|| "unknown device error".to_string());
        let category = attributes.get("category").and_then(|c| c.parse().ok());

        Self {
            message,
            category,
            attributes,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(category) => write!(f, "{} (category {})", self.message, category),
            None => f.write_str(&self.message),
        }
    }
}
