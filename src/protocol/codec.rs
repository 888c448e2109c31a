//! Frame envelope and primitive field encoding.
//!
//! # Responsibilities
//! - Read one envelope (magic + u16 length + payload) off a stream
//! - Bounds-checked field reads from a payload
//! - Build outgoing frames with a back-patched length
//!
//! # Design Decisions
//! - Lengths are assembled from `u8` values with `u16::from_be_bytes`, never
//!   from signed bytes
//! - A short read is an error, never a silent truncation
//! - Strings are ISO-8859-1 on the wire

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{AjpError, AjpResult, FramingError, ProtocolViolation};
use super::{BACKEND_MAGIC, ENVELOPE_LEN, NULL_STRING_LEN};

/// Run one socket operation under a deadline. Expiry becomes
/// [`AjpError::Timeout`] tagged with `phase`.
pub async fn with_deadline<F, T, E>(after: Duration, phase: &'static str, op: F) -> AjpResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AjpError>,
{
    match tokio::time::timeout(after, op).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(AjpError::Timeout { phase, after }),
    }
}

/// Read into `buf` until it is full or the stream ends. Returns bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Wait for the first byte of the next frame. `None` on a clean end of stream.
pub async fn read_frame_start<R>(reader: &mut R) -> std::io::Result<Option<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut first = [0u8; 1];
    let read = read_full(reader, &mut first).await?;
    Ok((read == 1).then_some(first[0]))
}

/// Read the rest of a frame whose first envelope byte was already consumed.
pub async fn read_frame_rest<R>(reader: &mut R, first: u8, magic: [u8; 2]) -> AjpResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut header = [first, 0, 0, 0];
    let read = 1 + read_full(reader, &mut header[1..]).await?;
    if read < ENVELOPE_LEN {
        return Err(FramingError::ShortHeader { read }.into());
    }

    let found = [header[0], header[1]];
    if found != magic {
        return Err(FramingError::BadMagic { expected: magic, found }.into());
    }

    let expected = usize::from(u16::from_be_bytes([header[2], header[3]]));
    let mut payload = vec![0u8; expected];
    let read = read_full(reader, &mut payload).await?;
    if read < expected {
        return Err(FramingError::ShortPacket { expected, read }.into());
    }

    Ok(Bytes::from(payload))
}

/// Read one frame, or `None` if the stream ended cleanly before its first byte.
pub async fn read_frame_or_eof<R>(reader: &mut R, magic: [u8; 2]) -> AjpResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    match read_frame_start(reader).await? {
        Some(first) => read_frame_rest(reader, first, magic).await.map(Some),
        None => Ok(None),
    }
}

/// Read one frame; end of stream is a `ShortHeader` error.
pub async fn read_frame<R>(reader: &mut R, magic: [u8; 2]) -> AjpResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    read_frame_or_eof(reader, magic)
        .await?
        .ok_or_else(|| FramingError::ShortHeader { read: 0 }.into())
}

/// Decode ISO-8859-1 bytes.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode to ISO-8859-1; characters outside the range become `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Cursor over a frame payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> AjpResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolViolation::Truncated { field, offset: self.pos }.into());
        }
        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self, field: &'static str) -> AjpResult<u8> {
        Ok(self.take(1, field)?[0])
    }

    /// Unsigned big-endian 16-bit integer.
    pub fn read_u16(&mut self, field: &'static str) -> AjpResult<u16> {
        let raw = self.take(2, field)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    /// One byte; only `1` is true.
    pub fn read_bool(&mut self, field: &'static str) -> AjpResult<bool> {
        Ok(self.read_u8(field)? == 1)
    }

    /// `len` string bytes followed by the ignored terminator byte.
    pub fn read_string_body(&mut self, len: usize, field: &'static str) -> AjpResult<String> {
        let text = decode_latin1(self.take(len, field)?);
        self.take(1, field)?;
        Ok(text)
    }

    /// Length-prefixed nullable string. A null consumes only its prefix.
    pub fn read_string(&mut self, field: &'static str) -> AjpResult<Option<String>> {
        let len = self.read_u16(field)?;
        if len == NULL_STRING_LEN {
            return Ok(None);
        }
        self.read_string_body(usize::from(len), field).map(Some)
    }
}

/// Builder for one outgoing frame.
///
/// Reserves the envelope up front and writes the payload length on
/// [`FrameBuilder::finish`].
#[derive(Debug)]
pub struct FrameBuilder {
    buf: BytesMut,
}

impl FrameBuilder {
    /// Backend → front-end frame.
    pub fn new() -> Self {
        Self::with_magic(BACKEND_MAGIC)
    }

    pub fn with_magic(magic: [u8; 2]) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(&magic);
        buf.put_u16(0);
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Length prefix, ISO-8859-1 bytes, terminator.
    pub fn put_string(&mut self, text: &str) -> AjpResult<&mut Self> {
        let bytes = encode_latin1(text);
        let len = string_len(bytes.len())?;
        self.buf.put_u16(len);
        self.buf.put_slice(&bytes);
        self.buf.put_u8(0);
        Ok(self)
    }

    /// Nullable variant of [`FrameBuilder::put_string`].
    pub fn put_opt_string(&mut self, text: Option<&str>) -> AjpResult<&mut Self> {
        match text {
            Some(text) => self.put_string(text),
            None => {
                self.buf.put_u16(NULL_STRING_LEN);
                Ok(self)
            }
        }
    }

    /// Patch the length field and hand back the wire bytes.
    pub fn finish(mut self) -> AjpResult<Bytes> {
        let payload_len = self.buf.len() - ENVELOPE_LEN;
        let len = u16::try_from(payload_len).map_err(|_| ProtocolViolation::FieldTooLong {
            field: "frame payload",
            len: payload_len,
        })?;
        self.buf[2..4].copy_from_slice(&len.to_be_bytes());
        Ok(self.buf.freeze())
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a string length against the null sentinel.
fn string_len(len: usize) -> AjpResult<u16> {
    match u16::try_from(len) {
        Ok(len) if len != NULL_STRING_LEN => Ok(len),
        _ => Err(ProtocolViolation::FieldTooLong { field: "string", len }.into()),
    }
}
