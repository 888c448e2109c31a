//! Handler trait and the request/response values crossing it.

use std::future::Future;

use bytes::Bytes;

use crate::protocol::RequestDescriptor;

/// A decoded request with its body fully assembled.
#[derive(Debug, Clone)]
pub struct AjpRequest {
    pub descriptor: RequestDescriptor,
    pub body: Bytes,
}

/// What the application hands back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjpResponse {
    pub status: u16,
    /// `"Name: Value"` lines.
    pub headers: Vec<String>,
    /// `"Set-Cookie: ..."` lines, sent after the headers.
    pub cookies: Vec<String>,
    pub body: Bytes,
    /// Reuse flag on the end-response frame.
    pub keep_alive: bool,
}

impl AjpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.headers.push(format!("{}: {}", name, value.as_ref()));
        self
    }

    pub fn cookie(mut self, value: impl AsRef<str>) -> Self {
        self.cookies.push(format!("Set-Cookie: {}", value.as_ref()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Ask the front end not to reuse the connection.
    pub fn close(mut self) -> Self {
        self.keep_alive = false;
        self
    }
}

/// Application code invoked once per request.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: AjpRequest) -> impl Future<Output = AjpResponse> + Send;
}
