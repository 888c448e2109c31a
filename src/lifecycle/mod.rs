//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     Ctrl-C / SIGTERM → Shutdown::trigger (a second signal exits at once)
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → live sessions drain → exit
//! ```
//!
//! # Design Decisions
//! - Live sessions get time to finish; idle keep-alive sessions are dropped at exit
//! - Draining has a deadline taken from `timeouts.drain_secs`

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
