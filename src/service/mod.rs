//! Application boundary.
//!
//! # Data Flow
//! ```text
//! Session (net/session.rs)
//!     → AjpRequest (descriptor + assembled body)
//!     → Handler::handle (application code)
//!     → AjpResponse (status, header lines, cookies, body, keep-alive)
//!     → ResponseWriter
//! ```
//!
//! # Design Decisions
//! - Handlers never touch the socket; the session owns all I/O
//! - Handlers are infallible: application errors become status codes

pub mod echo;
pub mod handler;

pub use echo::EchoHandler;
pub use handler::{AjpRequest, AjpResponse, Handler};
