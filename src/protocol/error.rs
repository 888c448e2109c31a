//! Protocol error taxonomy.
//!
//! Framing and protocol errors are always fatal for the connection. Retry
//! belongs to whoever owns the front-end connection pool.

use std::time::Duration;
use thiserror::Error;

/// Envelope-level failures: the byte stream can no longer be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The first two envelope bytes were not the expected magic.
    #[error("bad magic: expected {expected:02x?}, found {found:02x?}")]
    BadMagic { expected: [u8; 2], found: [u8; 2] },

    /// The stream ended inside the 4-byte envelope.
    #[error("short header: read {read} of 4 bytes")]
    ShortHeader { read: usize },

    /// The stream ended before the declared payload length was read.
    #[error("short packet: expected {expected} payload bytes, read {read}")]
    ShortPacket { expected: usize, read: usize },
}

/// Well-framed packet whose content breaks the protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("unknown packet type 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("invalid terminator: expected 0xff, found 0x{0:02x}")]
    InvalidTerminator(u8),

    /// A field ran past the end of the payload.
    #[error("truncated {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("unknown coded header 0x{0:04x}")]
    UnknownHeaderCode(u16),

    #[error("header line without colon: {0:?}")]
    MissingColon(String),

    #[error("{field} too long: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("body chunk of {chunk} bytes overruns remaining {remaining}")]
    BodyOverrun { chunk: usize, remaining: usize },

    #[error("declared body of {declared} bytes exceeds limit {limit}")]
    BodyTooLarge { declared: usize, limit: usize },
}

/// Errors that end an AJP13 connection.
#[derive(Debug, Error)]
pub enum AjpError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A body chunk frame carried fewer bytes than its body length field.
    #[error("short body chunk: declared {declared} bytes, received {received}")]
    ShortBodyChunk { declared: usize, received: usize },

    /// The peer never sent its first request.
    #[error("no request received within {0:?} of connection open")]
    FirstRequestTimeout(Duration),

    #[error("timed out after {after:?} while {phase}")]
    Timeout { phase: &'static str, after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AjpError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AjpError::Framing(_) => "framing",
            AjpError::Protocol(_) => "protocol",
            AjpError::ShortBodyChunk { .. } => "short_body_chunk",
            AjpError::FirstRequestTimeout(_) => "first_request_timeout",
            AjpError::Timeout { .. } => "timeout",
            AjpError::Io(_) => "io",
        }
    }
}

impl From<AjpError> for std::io::Error {
    fn from(err: AjpError) -> Self {
        use std::io::ErrorKind;
        match err {
            AjpError::Io(e) => e,
            AjpError::FirstRequestTimeout(_) | AjpError::Timeout { .. } => {
                std::io::Error::new(ErrorKind::TimedOut, err)
            }
            AjpError::Framing(FramingError::ShortHeader { .. })
            | AjpError::Framing(FramingError::ShortPacket { .. })
            | AjpError::ShortBodyChunk { .. } => std::io::Error::new(ErrorKind::UnexpectedEof, err),
            other => std::io::Error::new(ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for protocol operations.
pub type AjpResult<T> = Result<T, AjpError>;
