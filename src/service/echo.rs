//! Echo handler (default application for the binary).

use std::fmt::Write;

use super::handler::{AjpRequest, AjpResponse, Handler};
use crate::protocol::codec::encode_latin1;

/// Answers every request with a plain-text summary and echoes the body.
#[derive(Debug, Clone, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    async fn handle(&self, request: AjpRequest) -> AjpResponse {
        let d = &request.descriptor;
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} {} {}",
            d.method,
            d.uri.as_deref().unwrap_or("/"),
            d.protocol.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            text,
            "remote: {} ({})",
            d.remote_addr.as_deref().unwrap_or("-"),
            d.remote_host.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            text,
            "server: {}://{}:{}",
            d.scheme(),
            d.server_name.as_deref().unwrap_or("-"),
            d.server_port
        );
        if let Some(query) = &d.query_string {
            let _ = writeln!(text, "query: {}", query);
        }
        for line in &d.headers {
            let _ = writeln!(text, "{}", line);
        }
        let _ = writeln!(text);

        let mut body = encode_latin1(&text);
        body.extend_from_slice(&request.body);

        AjpResponse::ok()
            .header("Content-Type", "text/plain; charset=ISO-8859-1")
            .header("Content-Length", body.len().to_string())
            .body(body)
    }
}
