//! Shared utilities for integration testing: a bridge started on an
//! ephemeral port and a minimal AJP13 front end that talks to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ajp13_bridge::config::ListenerConfig;
use ajp13_bridge::lifecycle::Shutdown;
use ajp13_bridge::net::{ConnectionTracker, Listener, Server, SessionSettings};
use ajp13_bridge::protocol::codec::{read_frame, PacketReader};
use ajp13_bridge::protocol::tables::response_header_name;
use ajp13_bridge::protocol::{RequestDescriptor, BACKEND_MAGIC, CODED_HEADER_MARKER};
use ajp13_bridge::service::Handler;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// A bridge running in the background.
pub struct TestBridge {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    pub task: JoinHandle<()>,
}

/// Short timeouts so expiry paths run quickly.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        first_request_timeout: Duration::from_millis(500),
        keep_alive_timeout: Duration::from_millis(300),
        io_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

pub async fn start_bridge<H: Handler>(handler: H, settings: SessionSettings) -> TestBridge {
    let listener = Listener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        max_connections: 16,
    })
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = Server::with_settings(Arc::new(handler), settings, Duration::from_secs(2));
    let tracker = server.tracker();
    let task = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestBridge {
        addr,
        shutdown,
        tracker,
        task,
    }
}

/// A decoded response as the front end sees it.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Lengths of the individual body chunk frames.
    pub chunks: Vec<usize>,
    /// Number of get-body-chunk frames answered.
    pub body_requests: Vec<u16>,
    pub reuse: bool,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal front end: sends forward requests and serves body chunks.
pub struct FrontEnd {
    pub stream: TcpStream,
}

impl FrontEnd {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    pub async fn send(&mut self, request: &RequestDescriptor) {
        let frame = request.encode_frame().unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Send `request`, answer body requests from `body`, collect the response.
    pub async fn exchange(&mut self, request: &RequestDescriptor, body: &[u8]) -> Response {
        self.send(request).await;
        self.read_response(body).await
    }

    pub async fn read_response(&mut self, body: &[u8]) -> Response {
        let mut remaining = body;
        let mut response = Response {
            status: 0,
            headers: Vec::new(),
            body: Vec::new(),
            chunks: Vec::new(),
            body_requests: Vec::new(),
            reuse: false,
        };

        loop {
            let payload = read_frame(&mut self.stream, BACKEND_MAGIC).await.unwrap();
            let mut reader = PacketReader::new(&payload);
            match reader.read_u8("type").unwrap() {
                0x06 => {
                    let wanted = reader.read_u16("size").unwrap();
                    response.body_requests.push(wanted);
                    let n = remaining.len().min(usize::from(wanted));
                    let (chunk, rest) = remaining.split_at(n);
                    remaining = rest;
                    let mut frame = vec![0x12, 0x34];
                    frame.extend_from_slice(&((n + 2) as u16).to_be_bytes());
                    frame.extend_from_slice(&(n as u16).to_be_bytes());
                    frame.extend_from_slice(chunk);
                    self.stream.write_all(&frame).await.unwrap();
                }
                0x04 => {
                    response.status = reader.read_u16("status").unwrap();
                    reader.read_string("message").unwrap();
                    let count = reader.read_u16("count").unwrap();
                    for _ in 0..count {
                        let marker = reader.read_u16("name").unwrap();
                        let name = if (marker >> 8) as u8 == CODED_HEADER_MARKER {
                            response_header_name(marker).unwrap().to_string()
                        } else {
                            reader.read_string_body(usize::from(marker), "name").unwrap()
                        };
                        let value = reader.read_string("value").unwrap().unwrap_or_default();
                        response.headers.push((name, value));
                    }
                }
                0x03 => {
                    let len = usize::from(reader.read_u16("len").unwrap());
                    response.chunks.push(len);
                    for _ in 0..len {
                        response.body.push(reader.read_u8("chunk").unwrap());
                    }
                    assert_eq!(reader.read_u8("trailer").unwrap(), 0);
                }
                0x05 => {
                    response.reuse = reader.read_bool("reuse").unwrap();
                    return response;
                }
                other => panic!("unexpected packet type {:#04x}", other),
            }
        }
    }
}

pub fn get(uri: &str) -> RequestDescriptor {
    request("GET", uri, Vec::new())
}

pub fn request(method: &str, uri: &str, mut headers: Vec<String>) -> RequestDescriptor {
    headers.insert(0, "Host: example.com".into());
    RequestDescriptor {
        method: method.into(),
        protocol: Some("HTTP/1.1".into()),
        uri: Some(uri.into()),
        remote_addr: Some("10.0.0.7".into()),
        remote_host: Some("client.example.com".into()),
        server_name: Some("example.com".into()),
        server_port: 80,
        headers,
        ..RequestDescriptor::default()
    }
}
