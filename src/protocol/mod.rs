//! AJP13 wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Front end (web server / load balancer)
//!     → codec.rs (envelope: 0x12 0x34 + u16 length + payload)
//!     → request.rs (forward-request payload → RequestDescriptor)
//!     → body.rs (get-body-chunk / body-chunk stop-and-wait exchange)
//!     → [application handler]
//!     → response.rs (send-headers, send-body-chunk*, end-response)
//!     → Front end (envelope: 'A' 'B' + u16 length + payload)
//! ```
//!
//! # Design Decisions
//! - Every lookup table lives in tables.rs as a compile-time constant
//! - All multi-byte integers are read as explicit unsigned big-endian
//! - One request in flight per connection; no multiplexing

pub mod body;
pub mod codec;
pub mod error;
pub mod request;
pub mod response;
pub mod tables;

pub use body::BodyPuller;
pub use error::{AjpError, AjpResult, FramingError, ProtocolViolation};
pub use request::{RequestDescriptor, TlsInfo};
pub use response::ResponseWriter;

/// Magic bytes on frames sent by the front end.
pub const FRONT_END_MAGIC: [u8; 2] = [0x12, 0x34];

/// Magic bytes on frames sent by this backend ("AB").
pub const BACKEND_MAGIC: [u8; 2] = [0x41, 0x42];

/// Envelope size: two magic bytes plus the u16 length.
pub const ENVELOPE_LEN: usize = 4;

/// Largest body slice carried by a single chunk frame.
pub const MAX_CHUNK_LEN: usize = 8184;

/// Length prefix marking a null string.
pub const NULL_STRING_LEN: u16 = 0xFFFF;

/// Last byte of every forward-request payload.
pub const REQUEST_TERMINATOR: u8 = 0xFF;

/// High byte of a coded header name.
pub const CODED_HEADER_MARKER: u8 = 0xA0;

/// Packet type byte, the first byte of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    ForwardRequest = 0x02,
    SendBodyChunk = 0x03,
    SendHeaders = 0x04,
    EndResponse = 0x05,
    GetBodyChunk = 0x06,
}

impl From<PacketType> for u8 {
    fn from(kind: PacketType) -> u8 {
        kind as u8
    }
}
