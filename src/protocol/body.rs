//! Request body retrieval.
//!
//! # Responsibilities
//! - Ask the front end for the next body slice (get-body-chunk)
//! - Read the matching body-chunk frame and append it
//! - Stop once the declared content length is reached
//!
//! # Design Decisions
//! - Stop-and-wait: exactly one request outstanding at any time
//! - A chunk request never asks for more than 8184 bytes
//! - An empty chunk ends the body early; the handler sees what arrived

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::codec::{read_frame, with_deadline, PacketReader};
use super::error::{AjpError, AjpResult, ProtocolViolation};
use super::{PacketType, BACKEND_MAGIC, FRONT_END_MAGIC, MAX_CHUNK_LEN};

/// The 7-byte get-body-chunk frame asking for `len` bytes.
pub fn encode_get_body_chunk(len: u16) -> [u8; 7] {
    let [hi, lo] = len.to_be_bytes();
    [
        BACKEND_MAGIC[0],
        BACKEND_MAGIC[1],
        0x00,
        0x03,
        PacketType::GetBodyChunk.into(),
        hi,
        lo,
    ]
}

/// Pulls a declared-length body from the front end.
#[derive(Debug, Clone)]
pub struct BodyPuller {
    io_timeout: Duration,
    max_chunk: usize,
    max_body: usize,
}

impl BodyPuller {
    pub fn new(io_timeout: Duration) -> Self {
        Self {
            io_timeout,
            max_chunk: MAX_CHUNK_LEN,
            max_body: usize::MAX,
        }
    }

    /// Lower the per-request chunk size; clamped to 1..=8184.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.clamp(1, MAX_CHUNK_LEN);
        self
    }

    /// Refuse bodies declared larger than `max_body`.
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Pull `content_length` bytes. Zero issues no requests.
    pub async fn pull<S>(&self, stream: &mut S, content_length: usize) -> AjpResult<Bytes>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if content_length == 0 {
            return Ok(Bytes::new());
        }
        if content_length > self.max_body {
            return Err(ProtocolViolation::BodyTooLarge {
                declared: content_length,
                limit: self.max_body,
            }
            .into());
        }

        // Grows with each chunk.
        let mut body = BytesMut::with_capacity(content_length.min(self.max_chunk));
        while body.len() < content_length {
            let remaining = content_length - body.len();
            let wanted = remaining.min(self.max_chunk) as u16;

            let request = encode_get_body_chunk(wanted);
            with_deadline(self.io_timeout, "requesting body chunk", stream.write_all(&request)).await?;
            with_deadline(self.io_timeout, "requesting body chunk", stream.flush()).await?;

            let payload =
                with_deadline(self.io_timeout, "reading body", read_frame(stream, FRONT_END_MAGIC)).await?;
            if payload.is_empty() {
                tracing::warn!(
                    received = body.len(),
                    declared = content_length,
                    "Front end ended body early (empty frame)"
                );
                break;
            }

            let mut reader = PacketReader::new(&payload);
            let declared = usize::from(reader.read_u16("body length")?);
            if declared == 0 {
                tracing::warn!(
                    received = body.len(),
                    declared = content_length,
                    "Front end ended body early (zero-length chunk)"
                );
                break;
            }
            if reader.remaining() < declared {
                return Err(AjpError::ShortBodyChunk {
                    declared,
                    received: reader.remaining(),
                });
            }
            if declared > remaining {
                return Err(ProtocolViolation::BodyOverrun {
                    chunk: declared,
                    remaining,
                }
                .into());
            }

            let start = reader.position();
            body.extend_from_slice(&payload[start..start + declared]);
            tracing::trace!(received = body.len(), declared = content_length, "Body progress");
        }

        Ok(body.freeze())
    }
}
