//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chunk size within the protocol cap)
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::protocol::MAX_CHUNK_LEN;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("timeouts.keep_alive_secs ({keep_alive}) exceeds timeouts.first_request_secs ({first_request})")]
    KeepAliveTooLong { keep_alive: u64, first_request: u64 },

    #[error("limits.max_chunk_bytes must be between 1 and {max}, got {value}")]
    ChunkSize { value: usize, max: usize },

    #[error("observability.log_level: unknown level {0:?}")]
    LogLevel(String),

    #[error("observability.log_format: unknown format {0:?}")]
    LogFormat(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.first_request_secs", timeouts.first_request_secs),
        ("timeouts.keep_alive_secs", timeouts.keep_alive_secs),
        ("timeouts.io_secs", timeouts.io_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }
    if timeouts.keep_alive_secs > timeouts.first_request_secs {
        errors.push(ValidationError::KeepAliveTooLong {
            keep_alive: timeouts.keep_alive_secs,
            first_request: timeouts.first_request_secs,
        });
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_body_bytes"));
    }
    let chunk = config.limits.max_chunk_bytes;
    if chunk == 0 || chunk > MAX_CHUNK_LEN {
        errors.push(ValidationError::ChunkSize {
            value: chunk,
            max: MAX_CHUNK_LEN,
        });
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }
    if !LOG_FORMATS.contains(&observability.log_format.as_str()) {
        errors.push(ValidationError::LogFormat(observability.log_format.clone()));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
