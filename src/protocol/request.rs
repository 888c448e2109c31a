//! Forward-request packet parsing.
//!
//! # Responsibilities
//! - Validate packet type and trailing terminator
//! - Decode the fixed field sequence into a [`RequestDescriptor`]
//! - Expand coded header names and collect request attributes
//!
//! # Design Decisions
//! - The descriptor is built once per frame and never mutated afterwards
//! - Unknown attribute codes are skipped, unknown header codes are fatal
//! - TLS attributes mark the request secure even if the flag byte is clear

use std::collections::BTreeMap;

use bytes::Bytes;

use super::codec::{FrameBuilder, PacketReader};
use super::error::{AjpResult, ProtocolViolation};
use super::response::split_header_line;
use super::tables::{self, Attribute};
use super::{PacketType, CODED_HEADER_MARKER, FRONT_END_MAGIC, REQUEST_TERMINATOR};

/// TLS details forwarded by a TLS-terminating front end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Client certificate as forwarded (PEM text).
    pub cert: Option<String>,
    pub cipher_suite: Option<String>,
    /// Key size derived from the cipher suite name.
    pub key_size: Option<u16>,
    pub session: Option<String>,
}

/// One decoded forward request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub protocol: Option<String>,
    pub uri: Option<String>,
    pub remote_addr: Option<String>,
    /// Falls back to `remote_addr` when the front end sent none.
    pub remote_host: Option<String>,
    pub server_name: Option<String>,
    pub server_port: u16,
    pub is_secure: bool,
    /// `"Name: Value"` lines in wire order.
    pub headers: Vec<String>,
    pub attributes: BTreeMap<Attribute, String>,
    pub query_string: Option<String>,
    pub tls: Option<TlsInfo>,
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self {
            method: tables::UNKNOWN_METHOD.to_string(),
            protocol: None,
            uri: None,
            remote_addr: None,
            remote_host: None,
            server_name: None,
            server_port: 0,
            is_secure: false,
            headers: Vec::new(),
            attributes: BTreeMap::new(),
            query_string: None,
            tls: None,
        }
    }
}

impl RequestDescriptor {
    /// Parse a forward-request payload (envelope already stripped).
    pub fn parse(payload: &[u8]) -> AjpResult<Self> {
        let (&kind, _) = payload.split_first().ok_or(ProtocolViolation::Truncated {
            field: "packet type",
            offset: 0,
        })?;
        if kind != u8::from(PacketType::ForwardRequest) {
            return Err(ProtocolViolation::UnknownPacketType(kind).into());
        }
        let (&last, fields) = payload.split_last().ok_or(ProtocolViolation::Truncated {
            field: "terminator",
            offset: 0,
        })?;
        if last != REQUEST_TERMINATOR {
            return Err(ProtocolViolation::InvalidTerminator(last).into());
        }

        let mut reader = PacketReader::new(fields);
        reader.read_u8("packet type")?;

        let method = tables::method_name(reader.read_u8("method")?).to_string();
        let protocol = reader.read_string("protocol")?;
        let uri = reader.read_string("uri")?;
        let remote_addr = reader.read_string("remote address")?;
        let remote_host = reader.read_string("remote host")?;
        let server_name = reader.read_string("server name")?;
        let server_port = reader.read_u16("server port")?;
        let is_secure = reader.read_bool("secure flag")?;

        let header_count = usize::from(reader.read_u16("header count")?);
        let mut headers = Vec::with_capacity(header_count.min(reader.remaining() / 4));
        for _ in 0..header_count {
            let raw = reader.read_u16("header name")?;
            let name = if raw.to_be_bytes()[0] == CODED_HEADER_MARKER {
                tables::request_header_name(raw)
                    .ok_or(ProtocolViolation::UnknownHeaderCode(raw))?
                    .to_string()
            } else {
                reader.read_string_body(usize::from(raw), "header name")?
            };
            let value = reader.read_string("header value")?.unwrap_or_default();
            headers.push(format!("{}: {}", name, value));
        }

        let mut request = Self {
            method,
            protocol,
            uri,
            remote_host: remote_host
                .filter(|host| !host.is_empty())
                .or_else(|| remote_addr.clone()),
            remote_addr,
            server_name,
            server_port,
            is_secure,
            headers,
            ..Self::default()
        };

        // Fewer than two bytes before the terminator cannot hold an attribute.
        while reader.remaining() >= 2 {
            let code = reader.read_u8("attribute type")?;
            let value = reader.read_string("attribute value")?;
            match (Attribute::from_code(code), value) {
                (Some(attr), Some(value)) => request.apply_attribute(attr, value),
                (Some(attr), None) => {
                    tracing::trace!(attribute = attr.name(), "Null attribute value");
                }
                (None, _) => {
                    tracing::debug!(code, "Skipping unknown attribute");
                }
            }
        }

        tracing::trace!(
            method = %request.method,
            uri = ?request.uri,
            headers = request.headers.len(),
            attributes = request.attributes.len(),
            payload_len = payload.len(),
            "Forward request parsed"
        );

        Ok(request)
    }

    fn apply_attribute(&mut self, attr: Attribute, value: String) {
        match attr {
            Attribute::QueryString => self.query_string = Some(value.clone()),
            Attribute::SslCert => {
                self.tls.get_or_insert_with(TlsInfo::default).cert = Some(value.clone());
                self.is_secure = true;
            }
            Attribute::SslCipher => {
                let tls = self.tls.get_or_insert_with(TlsInfo::default);
                tls.key_size = tables::cipher_key_size(&value);
                tls.cipher_suite = Some(value.clone());
                self.is_secure = true;
            }
            Attribute::SslSession => {
                self.tls.get_or_insert_with(TlsInfo::default).session = Some(value.clone());
                self.is_secure = true;
            }
            _ => {}
        }
        self.attributes.insert(attr, value);
    }

    /// First header value with this name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Declared body length; `None` when absent or unparsable.
    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length")?.parse().ok()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure {
            "https"
        } else {
            "http"
        }
    }

    pub fn attribute(&self, attr: Attribute) -> Option<&str> {
        self.attributes.get(&attr).map(String::as_str)
    }

    /// Encode as a complete front-end frame. Header names found in the
    /// request header table are sent coded.
    pub fn encode_frame(&self) -> AjpResult<Bytes> {
        let mut frame = FrameBuilder::with_magic(FRONT_END_MAGIC);
        frame
            .put_u8(PacketType::ForwardRequest.into())
            .put_u8(tables::method_code(&self.method).unwrap_or(0));
        frame.put_opt_string(self.protocol.as_deref())?;
        frame.put_opt_string(self.uri.as_deref())?;
        frame.put_opt_string(self.remote_addr.as_deref())?;
        frame.put_opt_string(self.remote_host.as_deref())?;
        frame.put_opt_string(self.server_name.as_deref())?;
        frame.put_u16(self.server_port).put_bool(self.is_secure);

        let count = u16::try_from(self.headers.len()).map_err(|_| ProtocolViolation::FieldTooLong {
            field: "header count",
            len: self.headers.len(),
        })?;
        frame.put_u16(count);
        for line in &self.headers {
            let (name, value) = split_header_line(line)?;
            match tables::request_header_code(name) {
                Some(code) => {
                    frame.put_u16(code);
                }
                None => {
                    frame.put_string(name)?;
                }
            }
            frame.put_string(value)?;
        }

        for (attr, value) in &self.attributes {
            frame.put_u8(attr.code());
            frame.put_string(value)?;
        }
        frame.put_u8(REQUEST_TERMINATOR);
        frame.finish()
    }
}
