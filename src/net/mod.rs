//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → server.rs (spawn per-connection task, shutdown drain)
//!     → session.rs (AJP13 state machine)
//!     → Hand off to the service Handler
//!
//! Connection States:
//!     AwaitingRequest → [ReadingBody] → WritingResponse → KeepAliveWait → ... → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One task per connection; nothing but constant tables is shared

pub mod connection;
pub mod listener;
pub mod server;
pub mod session;

pub use connection::{ConnectionId, ConnectionState, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use server::Server;
pub use session::{Session, SessionEnd, SessionSettings};
