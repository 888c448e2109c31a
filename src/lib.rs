//! AJP13 backend bridge library.
//!
//! Accepts AJP13 connections from a front-end web server, decodes forwarded
//! requests, pulls request bodies on demand and streams responses back.

// Core subsystems
pub mod config;
pub mod net;
pub mod protocol;
pub mod service;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::BridgeConfig;
pub use lifecycle::Shutdown;
pub use net::{Listener, Server};
pub use service::{AjpRequest, AjpResponse, EchoHandler, Handler};
