//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::protocol::MAX_CHUNK_LEN;

/// Root configuration for the AJP13 bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Socket timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body and chunk size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8009").
    pub bind_address: String,

    /// Maximum concurrent front-end connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8009".to_string(),
            max_connections: 1_000,
        }
    }
}

/// Timeout configuration for connection phases.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait for the first request on a fresh connection, in seconds.
    /// Expiry is an error.
    pub first_request_secs: u64,

    /// Wait for a follow-up request on a kept-alive connection, in seconds.
    /// Expiry closes the connection quietly.
    pub keep_alive_secs: u64,

    /// Per-operation deadline while reading a body or writing a response.
    pub io_secs: u64,

    /// How long shutdown waits for live connections to finish.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            first_request_secs: 60,
            keep_alive_secs: 60,
            io_secs: 60,
            drain_secs: 30,
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,

    /// Largest chunk requested from or sent to the front end (max 8184).
    pub max_chunk_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024 * 1024, // 16MB
            max_chunk_bytes: MAX_CHUNK_LEN,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
