//! Per-connection protocol driver.
//!
//! # Responsibilities
//! - Own one front-end stream for its whole lifetime
//! - Run the request → body → handler → response → keep-alive cycle
//! - Decide whether a read timeout is a failure or a quiet keep-alive expiry
//!
//! # State Machine
//! ```text
//! AwaitingRequest ──frame──▶ [ReadingBody] ──▶ handler ──▶ WritingResponse
//!        ▲                                                        │
//!        └──────frame────── KeepAliveWait ◀──── end-response ─────┘
//!                                 │
//!                          timeout / EOF ──▶ Closed (clean)
//! any state ── framing / protocol error ──▶ Closed (error)
//! ```
//!
//! # Design Decisions
//! - Strictly half-duplex: nothing is written while a read is outstanding
//! - All state is owned by the session; only the constant tables are shared
//! - Cancellation is expressed through read/write deadlines only

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::BridgeConfig;
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::observability::metrics;
use crate::protocol::codec::{read_frame_rest, read_frame_start, with_deadline};
use crate::protocol::{
    AjpError, AjpResult, BodyPuller, FramingError, RequestDescriptor, ResponseWriter, FRONT_END_MAGIC,
};
use crate::service::{AjpRequest, Handler};

/// Timeouts and limits applied to each session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wait for the first frame on a fresh connection. Expiry is an error.
    pub first_request_timeout: Duration,
    /// Wait for a follow-up frame. Expiry closes quietly.
    pub keep_alive_timeout: Duration,
    /// Deadline for each body read and response write.
    pub io_timeout: Duration,
    pub max_body_bytes: usize,
    pub max_chunk_bytes: usize,
}

impl SessionSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            first_request_timeout: Duration::from_secs(config.timeouts.first_request_secs),
            keep_alive_timeout: Duration::from_secs(config.timeouts.keep_alive_secs),
            io_timeout: Duration::from_secs(config.timeouts.io_secs),
            max_body_bytes: config.limits.max_body_bytes,
            max_chunk_bytes: config.limits.max_chunk_bytes,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Why a session finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// No follow-up request arrived within the keep-alive timeout.
    KeepAliveExpired,
    /// The front end closed the connection between requests.
    PeerClosed,
    /// The last response was sent with the reuse flag cleared.
    NotReused,
}

enum Incoming {
    Frame(Bytes),
    Ended(SessionEnd),
}

/// Drives one front-end connection.
pub struct Session<S, H> {
    id: ConnectionId,
    stream: S,
    handler: Arc<H>,
    settings: SessionSettings,
    state: ConnectionState,
    fresh: bool,
    requests_served: u64,
}

impl<S, H> Session<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: Handler,
{
    pub fn new(id: ConnectionId, stream: S, handler: Arc<H>, settings: SessionSettings) -> Self {
        Self {
            id,
            stream,
            handler,
            settings,
            state: ConnectionState::AwaitingRequest,
            fresh: true,
            requests_served: 0,
        }
    }

    /// Serve requests until the connection ends. The stream is shut down
    /// before returning, on success and on error alike.
    pub async fn run(mut self) -> AjpResult<SessionEnd> {
        let result = self.serve().await;
        self.transition(ConnectionState::Closed);

        let _ = tokio::time::timeout(self.settings.io_timeout, self.stream.shutdown()).await;

        match &result {
            Ok(end) => tracing::debug!(
                connection_id = %self.id,
                requests = self.requests_served,
                reason = ?end,
                "Session closed"
            ),
            Err(err) => metrics::record_session_error(err.kind()),
        }
        result
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::trace!(connection_id = %self.id, from = %self.state, to = %next, "State change");
            self.state = next;
        }
    }

    async fn serve(&mut self) -> AjpResult<SessionEnd> {
        loop {
            let payload = match self.next_frame().await? {
                Incoming::Frame(payload) => payload,
                Incoming::Ended(end) => return Ok(end),
            };
            if payload.is_empty() {
                tracing::debug!(connection_id = %self.id, "Ignoring empty request frame");
                self.transition(ConnectionState::KeepAliveWait);
                continue;
            }

            let keep_alive = self.exchange(&payload).await?;
            if !keep_alive {
                return Ok(SessionEnd::NotReused);
            }
            self.transition(ConnectionState::KeepAliveWait);
        }
    }

    /// Wait for the next front-end frame. The phase timeout covers only the
    /// idle wait for its first byte; the rest of the frame is read under
    /// `io_timeout`.
    async fn next_frame(&mut self) -> AjpResult<Incoming> {
        let (limit, first) = if self.fresh {
            (self.settings.first_request_timeout, true)
        } else {
            (self.settings.keep_alive_timeout, false)
        };

        let start = match tokio::time::timeout(limit, read_frame_start(&mut self.stream)).await {
            Err(_) if first => return Err(AjpError::FirstRequestTimeout(limit)),
            Err(_) => {
                tracing::debug!(connection_id = %self.id, timeout = ?limit, "Keep-alive expired");
                return Ok(Incoming::Ended(SessionEnd::KeepAliveExpired));
            }
            Ok(result) => result?,
        };
        let Some(byte) = start else {
            if first {
                return Err(FramingError::ShortHeader { read: 0 }.into());
            }
            return Ok(Incoming::Ended(SessionEnd::PeerClosed));
        };

        let payload = with_deadline(
            self.settings.io_timeout,
            "reading request",
            read_frame_rest(&mut self.stream, byte, FRONT_END_MAGIC),
        )
        .await?;
        self.fresh = false;
        self.transition(ConnectionState::AwaitingRequest);
        Ok(Incoming::Frame(payload))
    }

    /// One request/response exchange. Returns the reuse flag that was sent.
    async fn exchange(&mut self, payload: &[u8]) -> AjpResult<bool> {
        let started = Instant::now();
        let descriptor = RequestDescriptor::parse(payload)?;
        let method = descriptor.method.clone();

        let content_length = descriptor.content_length().unwrap_or(0);
        let body = if content_length > 0 {
            self.transition(ConnectionState::ReadingBody);
            BodyPuller::new(self.settings.io_timeout)
                .with_max_chunk(self.settings.max_chunk_bytes)
                .with_max_body(self.settings.max_body_bytes)
                .pull(&mut self.stream, content_length)
                .await?
        } else {
            Bytes::new()
        };

        tracing::debug!(
            connection_id = %self.id,
            method = %method,
            uri = descriptor.uri.as_deref().unwrap_or(""),
            remote_addr = descriptor.remote_addr.as_deref().unwrap_or(""),
            body_len = body.len(),
            "Dispatching request"
        );

        let response = self.handler.handle(AjpRequest { descriptor, body }).await;

        self.transition(ConnectionState::WritingResponse);
        let mut writer = ResponseWriter::new(&mut self.stream, self.settings.io_timeout)
            .with_max_chunk(self.settings.max_chunk_bytes);
        writer
            .send_headers(response.status, &response.headers, &response.cookies)
            .await?;
        writer.send_body(&response.body).await?;
        writer.end(response.keep_alive).await?;

        self.requests_served += 1;
        metrics::record_request(&method, response.status, started);
        tracing::debug!(
            connection_id = %self.id,
            method = %method,
            status = response.status,
            body_len = response.body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response sent"
        );
        Ok(response.keep_alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::read_frame;
    use crate::protocol::{ProtocolViolation, BACKEND_MAGIC};
    use crate::service::AjpResponse;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, DuplexStream};

    /// Handler backed by a closure; records every request it sees.
    struct FnHandler<F> {
        respond: F,
        seen: Mutex<Vec<AjpRequest>>,
    }

    impl<F> Handler for FnHandler<F>
    where
        F: Fn(&AjpRequest) -> AjpResponse + Send + Sync + 'static,
    {
        async fn handle(&self, request: AjpRequest) -> AjpResponse {
            let response = (self.respond)(&request);
            self.seen.lock().unwrap().push(request);
            response
        }
    }

    fn handler<F>(respond: F) -> Arc<FnHandler<F>>
    where
        F: Fn(&AjpRequest) -> AjpResponse + Send + Sync + 'static,
    {
        Arc::new(FnHandler {
            respond,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            first_request_timeout: Duration::from_millis(500),
            keep_alive_timeout: Duration::from_millis(100),
            io_timeout: Duration::from_secs(1),
            ..SessionSettings::default()
        }
    }

    fn request_frame(method: &str, uri: &str, headers: &[&str]) -> Bytes {
        RequestDescriptor {
            method: method.into(),
            protocol: Some("HTTP/1.1".into()),
            uri: Some(uri.into()),
            remote_addr: Some("127.0.0.1".into()),
            server_name: Some("example.com".into()),
            server_port: 80,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            ..RequestDescriptor::default()
        }
        .encode_frame()
        .unwrap()
    }

    /// Read backend frames up to and including end-response.
    async fn read_response(front: &mut DuplexStream) -> Vec<Bytes> {
        let mut frames = Vec::new();
        loop {
            let frame = read_frame(front, BACKEND_MAGIC).await.unwrap();
            let done = frame[0] == 0x05;
            frames.push(frame);
            if done {
                return frames;
            }
        }
    }

    #[tokio::test]
    async fn serves_simple_get() {
        let (mut front, back) = tokio::io::duplex(64 * 1024);
        let handler = handler(|_| {
            AjpResponse::ok()
                .header("Content-Type", "text/plain")
                .body("hi")
        });
        let session = Session::new(ConnectionId::new(), back, handler.clone(), settings());
        let task = tokio::spawn(session.run());

        front
            .write_all(&request_frame("GET", "/index.html", &["Host: example.com"]))
            .await
            .unwrap();
        let frames = read_response(&mut front).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][0], 0x04);
        assert_eq!(&frames[0][1..3], &200u16.to_be_bytes());
        assert_eq!(&frames[1][..], &[0x03, 0x00, 0x02, b'h', b'i', 0x00]);
        assert_eq!(&frames[2][..], &[0x05, 0x01]);

        drop(front);
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::PeerClosed);

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0].descriptor;
        assert_eq!(request.method, "GET");
        assert_eq!(request.uri.as_deref(), Some("/index.html"));
        assert!(request.headers.contains(&"Host: example.com".to_string()));
        assert!(seen[0].body.is_empty());
    }

    #[tokio::test]
    async fn keep_alive_serves_several_requests_then_expires() {
        let (mut front, back) = tokio::io::duplex(64 * 1024);
        let handler = handler(|req| AjpResponse::ok().body(req.descriptor.uri.clone().unwrap_or_default()));
        let session = Session::new(ConnectionId::new(), back, handler.clone(), settings());
        let task = tokio::spawn(session.run());

        for uri in ["/a", "/b", "/c"] {
            front.write_all(&request_frame("GET", uri, &[])).await.unwrap();
            let frames = read_response(&mut front).await;
            assert_eq!(&frames[1][3..3 + uri.len()], uri.as_bytes());
            assert_eq!(frames.last().unwrap()[1], 1);
        }

        // Idle past the keep-alive timeout: a clean close, not an error.
        let end = task.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::KeepAliveExpired);
        assert_eq!(handler.seen.lock().unwrap().len(), 3);

        let mut rest = Vec::new();
        front.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn first_request_timeout_is_an_error() {
        let (_front, back) = tokio::io::duplex(1024);
        let mut settings = settings();
        settings.first_request_timeout = Duration::from_millis(100);
        let session = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, AjpError::FirstRequestTimeout(_)));
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn same_timeout_differs_by_phase() {
        // Identical 100ms limits: fatal before the first request, quiet after.
        let mut settings = settings();
        settings.first_request_timeout = Duration::from_millis(100);
        settings.keep_alive_timeout = Duration::from_millis(100);

        let (_idle, back) = tokio::io::duplex(1024);
        let fresh = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings.clone());
        assert!(fresh.run().await.is_err());

        let (mut front, back) = tokio::io::duplex(1024);
        let used = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings);
        let task = tokio::spawn(used.run());
        front.write_all(&request_frame("GET", "/", &[])).await.unwrap();
        read_response(&mut front).await;
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::KeepAliveExpired);
    }

    #[tokio::test]
    async fn stalled_partial_frame_after_keep_alive_is_an_error() {
        let (mut front, back) = tokio::io::duplex(1024);
        let mut settings = settings();
        settings.keep_alive_timeout = Duration::from_millis(100);
        settings.io_timeout = Duration::from_millis(300);
        let session = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings);
        let task = tokio::spawn(session.run());

        front.write_all(&request_frame("GET", "/", &[])).await.unwrap();
        read_response(&mut front).await;

        // Envelope promises 16 bytes; only 3 arrive.
        front
            .write_all(&[0x12, 0x34, 0x00, 0x10, 0x02, 0x02, 0x00])
            .await
            .unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, AjpError::Timeout { phase: "reading request", .. }));
    }

    #[tokio::test]
    async fn truncated_frame_after_keep_alive_is_short_packet() {
        let (mut front, back) = tokio::io::duplex(1024);
        let session = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings());
        let task = tokio::spawn(session.run());

        front.write_all(&request_frame("GET", "/", &[])).await.unwrap();
        read_response(&mut front).await;

        front
            .write_all(&[0x12, 0x34, 0x00, 0x10, 0x02, 0x02, 0x00])
            .await
            .unwrap();
        drop(front);
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            AjpError::Framing(FramingError::ShortPacket { expected: 16, read: 3 })
        ));
    }

    #[tokio::test]
    async fn pulls_declared_body_before_dispatch() {
        let (mut front, back) = tokio::io::duplex(64 * 1024);
        let handler = handler(|req| AjpResponse::ok().body(req.body.clone()));
        let session = Session::new(ConnectionId::new(), back, handler.clone(), settings());
        let task = tokio::spawn(session.run());

        front
            .write_all(&request_frame("POST", "/form", &["Content-Length: 5"]))
            .await
            .unwrap();

        let mut get_chunk = [0u8; 7];
        front.read_exact(&mut get_chunk).await.unwrap();
        assert_eq!(get_chunk, [0x41, 0x42, 0x00, 0x03, 0x06, 0x00, 0x05]);
        front
            .write_all(&[0x12, 0x34, 0x00, 0x07, 0x00, 0x05, b'a', b'=', b'1', b'&', b'b'])
            .await
            .unwrap();

        let frames = read_response(&mut front).await;
        assert_eq!(&frames[1][3..8], b"a=1&b");
        drop(front);
        task.await.unwrap().unwrap();
        assert_eq!(&handler.seen.lock().unwrap()[0].body[..], b"a=1&b");
    }

    #[tokio::test]
    async fn protocol_violation_closes_connection() {
        let (mut front, back) = tokio::io::duplex(1024);
        let handler = handler(|_| AjpResponse::ok());
        let session = Session::new(ConnectionId::new(), back, handler.clone(), settings());
        let task = tokio::spawn(session.run());

        // CPING is not served: unknown packet type.
        front.write_all(&[0x12, 0x34, 0x00, 0x01, 0x0A]).await.unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            AjpError::Protocol(ProtocolViolation::UnknownPacketType(0x0A))
        ));

        let mut rest = Vec::new();
        front.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_magic_is_fatal() {
        let (mut front, back) = tokio::io::duplex(1024);
        let session = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings());
        let task = tokio::spawn(session.run());

        front.write_all(&[0x41, 0x42, 0x00, 0x00]).await.unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, AjpError::Framing(FramingError::BadMagic { .. })));
    }

    #[tokio::test]
    async fn response_without_reuse_ends_session() {
        let (mut front, back) = tokio::io::duplex(1024);
        let session = Session::new(
            ConnectionId::new(),
            back,
            handler(|_| AjpResponse::new(503).close()),
            settings(),
        );
        let task = tokio::spawn(session.run());

        front.write_all(&request_frame("GET", "/", &[])).await.unwrap();
        let frames = read_response(&mut front).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][1..3], &503u16.to_be_bytes());
        assert_eq!(&frames[1][..], &[0x05, 0x00]);
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::NotReused);
    }

    #[tokio::test]
    async fn empty_frame_is_ignored() {
        let (mut front, back) = tokio::io::duplex(1024);
        let handler = handler(|_| AjpResponse::ok());
        let session = Session::new(ConnectionId::new(), back, handler.clone(), settings());
        let task = tokio::spawn(session.run());

        front.write_all(&[0x12, 0x34, 0x00, 0x00]).await.unwrap();
        front.write_all(&request_frame("HEAD", "/", &[])).await.unwrap();
        read_response(&mut front).await;
        drop(front);

        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::PeerClosed);
        assert_eq!(handler.seen.lock().unwrap()[0].descriptor.method, "HEAD");
    }

    #[tokio::test]
    async fn eof_before_first_request_is_short_header() {
        let (front, back) = tokio::io::duplex(1024);
        drop(front);
        let session = Session::new(ConnectionId::new(), back, handler(|_| AjpResponse::ok()), settings());
        let err = session.run().await.unwrap_err();
        assert!(matches!(err, AjpError::Framing(FramingError::ShortHeader { read: 0 })));
    }
}
