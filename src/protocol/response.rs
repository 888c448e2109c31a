//! Response serialization back to the front end.
//!
//! # Responsibilities
//! - Encode status and headers into one send-headers frame
//! - Split the body into send-body-chunk frames of at most 8184 bytes
//! - Emit the end-response frame carrying the reuse flag
//!
//! # Design Decisions
//! - Headers go out exactly once, on the first flush
//! - Response header names are coded when the table knows them
//! - Frames are assembled in memory and written with one `write_all` each

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::codec::{with_deadline, FrameBuilder};
use super::error::{AjpResult, ProtocolViolation};
use super::tables;
use super::{PacketType, MAX_CHUNK_LEN};

/// Split a `"Name: Value"` line at its first colon, trimming both halves.
pub fn split_header_line(line: &str) -> AjpResult<(&str, &str)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolViolation::MissingColon(line.to_string()))?;
    Ok((name.trim(), value.trim()))
}

/// Build the send-headers frame.
pub fn encode_headers(status: u16, headers: &[String], cookies: &[String]) -> AjpResult<Bytes> {
    let lines = headers.len() + cookies.len();
    let count = u16::try_from(lines).map_err(|_| ProtocolViolation::FieldTooLong {
        field: "header count",
        len: lines,
    })?;

    let mut frame = FrameBuilder::new();
    frame
        .put_u8(PacketType::SendHeaders.into())
        .put_u16(status)
        .put_u16(0) // empty status message
        .put_u8(0)
        .put_u16(count);

    for line in headers.iter().chain(cookies) {
        let (name, value) = split_header_line(line)?;
        match tables::response_header_code(name) {
            Some(code) => {
                frame.put_u16(code);
            }
            None => {
                frame.put_string(name)?;
            }
        }
        frame.put_string(value)?;
    }
    frame.finish()
}

/// Build one send-body-chunk frame. `chunk` must not exceed the chunk cap.
pub fn encode_body_chunk(chunk: &[u8]) -> AjpResult<Bytes> {
    if chunk.len() > MAX_CHUNK_LEN {
        return Err(ProtocolViolation::FieldTooLong {
            field: "body chunk",
            len: chunk.len(),
        }
        .into());
    }
    let mut frame = FrameBuilder::new();
    frame
        .put_u8(PacketType::SendBodyChunk.into())
        .put_u16(chunk.len() as u16)
        .put_slice(chunk)
        .put_u8(0);
    frame.finish()
}

/// Build the end-response frame.
pub fn encode_end_response(reuse: bool) -> AjpResult<Bytes> {
    let mut frame = FrameBuilder::new();
    frame.put_u8(PacketType::EndResponse.into()).put_bool(reuse);
    frame.finish()
}

/// Writes one response onto the connection.
pub struct ResponseWriter<'a, W> {
    out: &'a mut W,
    io_timeout: Duration,
    max_chunk: usize,
    headers_sent: bool,
    body_bytes: usize,
}

impl<'a, W> ResponseWriter<'a, W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(out: &'a mut W, io_timeout: Duration) -> Self {
        Self {
            out,
            io_timeout,
            max_chunk: MAX_CHUNK_LEN,
            headers_sent: false,
            body_bytes: 0,
        }
    }

    /// Lower the body chunk size; values above 8184 are clamped.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.clamp(1, MAX_CHUNK_LEN);
        self
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Body bytes written so far.
    pub fn body_bytes(&self) -> usize {
        self.body_bytes
    }

    async fn write_frame(&mut self, frame: &[u8]) -> AjpResult<()> {
        with_deadline(self.io_timeout, "writing response", self.out.write_all(frame)).await
    }

    /// Send status and headers. Only the first call writes anything.
    pub async fn send_headers(
        &mut self,
        status: u16,
        headers: &[String],
        cookies: &[String],
    ) -> AjpResult<()> {
        if self.headers_sent {
            return Ok(());
        }
        let frame = encode_headers(status, headers, cookies)?;
        self.write_frame(&frame).await?;
        self.headers_sent = true;
        tracing::trace!(status, headers = headers.len(), cookies = cookies.len(), "Headers sent");
        Ok(())
    }

    /// Stream body bytes as chunk frames. Sends a bare 200 header frame
    /// first if no headers went out yet.
    pub async fn send_body(&mut self, body: &[u8]) -> AjpResult<()> {
        if !self.headers_sent {
            self.send_headers(200, &[], &[]).await?;
        }
        for chunk in body.chunks(self.max_chunk) {
            let frame = encode_body_chunk(chunk)?;
            self.write_frame(&frame).await?;
            self.body_bytes += chunk.len();
        }
        Ok(())
    }

    /// Send end-response and flush.
    pub async fn end(&mut self, reuse: bool) -> AjpResult<()> {
        let frame = encode_end_response(reuse)?;
        self.write_frame(&frame).await?;
        with_deadline(self.io_timeout, "flushing response", self.out.flush()).await?;
        tracing::trace!(body_bytes = self.body_bytes, reuse, "Response complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error::AjpError;

    #[test]
    fn header_frame_layout() {
        let frame = encode_headers(
            200,
            &["Content-Type: text/plain".to_string(), "X-Id: 7".to_string()],
            &["Set-Cookie: sid=1; Path=/".to_string()],
        )
        .unwrap();

        // Envelope + fixed prefix.
        assert_eq!(&frame[..2], &[0x41, 0x42]);
        let len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(frame[4], 0x04);
        assert_eq!(&frame[5..7], &200u16.to_be_bytes());
        assert_eq!(&frame[7..10], &[0x00, 0x00, 0x00]);
        assert_eq!(&frame[10..12], &[0x00, 0x03]);

        // Content-Type is coded, X-Id literal, Set-Cookie coded.
        let headers = &frame[12..];
        assert_eq!(&headers[..2], &[0xA0, 0x01]);
        assert_eq!(&headers[2..4], &[0x00, 0x0A]);
        assert_eq!(&headers[4..14], b"text/plain");
        assert_eq!(headers[14], 0);
        assert_eq!(&headers[15..17], &[0x00, 0x04]);
        assert_eq!(&headers[17..21], b"X-Id");
        assert_eq!(len, headers.len() + 8);
        assert!(headers.windows(2).any(|w| w == [0xA0, 0x07]));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let err = encode_headers(200, &["broken".to_string()], &[]).unwrap_err();
        assert!(matches!(
            err,
            AjpError::Protocol(ProtocolViolation::MissingColon(ref line)) if line == "broken"
        ));
    }

    #[test]
    fn body_chunk_layout() {
        let frame = encode_body_chunk(b"hi").unwrap();
        assert_eq!(&frame[..], &[0x41, 0x42, 0x00, 0x06, 0x03, 0x00, 0x02, b'h', b'i', 0x00]);
        assert!(encode_body_chunk(&[0u8; MAX_CHUNK_LEN + 1]).is_err());
    }

    #[test]
    fn end_response_layout() {
        assert_eq!(&encode_end_response(true).unwrap()[..], &[0x41, 0x42, 0x00, 0x02, 0x05, 0x01]);
        assert_eq!(&encode_end_response(false).unwrap()[..], &[0x41, 0x42, 0x00, 0x02, 0x05, 0x00]);
    }

    #[tokio::test]
    async fn writer_chunks_large_bodies() {
        let mut out: Vec<u8> = Vec::new();
        let body = vec![0x5Au8; MAX_CHUNK_LEN * 2 + 10];
        {
            let mut writer = ResponseWriter::new(&mut out, Duration::from_secs(1));
            writer.send_headers(200, &[], &[]).await.unwrap();
            writer.send_headers(500, &[], &[]).await.unwrap(); // ignored
            writer.send_body(&body).await.unwrap();
            assert_eq!(writer.body_bytes(), body.len());
            writer.end(true).await.unwrap();
        }

        // headers(12) + 2 full chunks + one 10-byte chunk + end(6)
        let full_chunk = MAX_CHUNK_LEN + 8;
        assert_eq!(out.len(), 12 + 2 * full_chunk + (10 + 8) + 6);
        assert_eq!(&out[5..7], &200u16.to_be_bytes());
        let first_chunk = &out[12..12 + full_chunk];
        assert_eq!(u16::from_be_bytes([first_chunk[2], first_chunk[3]]) as usize, MAX_CHUNK_LEN + 4);
        assert_eq!(u16::from_be_bytes([first_chunk[5], first_chunk[6]]) as usize, MAX_CHUNK_LEN);
        assert_eq!(out[out.len() - 1], 1);
    }

    #[tokio::test]
    async fn writer_respects_lower_chunk_cap() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut writer = ResponseWriter::new(&mut out, Duration::from_secs(1)).with_max_chunk(4);
            writer.send_headers(204, &[], &[]).await.unwrap();
            writer.send_body(b"abcdefghij").await.unwrap();
            writer.end(false).await.unwrap();
        }
        // Three chunks: 4 + 4 + 2 bytes.
        assert_eq!(out.len(), 12 + (4 + 8) * 2 + (2 + 8) + 6);
    }

    #[tokio::test]
    async fn body_without_headers_sends_bare_200() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut writer = ResponseWriter::new(&mut out, Duration::from_secs(1));
            writer.send_body(b"ok").await.unwrap();
            assert!(writer.headers_sent());
            writer.end(true).await.unwrap();
        }
        assert_eq!(&out[..12], &[0x41, 0x42, 0x00, 0x08, 0x04, 0x00, 0xC8, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&out[12..22], &[0x41, 0x42, 0x00, 0x06, 0x03, 0x00, 0x02, b'o', b'k', 0x00]);
    }
}
