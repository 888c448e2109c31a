//! AJP13 Backend Bridge
//!
//! Speaks the AJP13 protocol to a front-end web server and hands every
//! forwarded request to an in-process handler.
//!
//! # Architecture Overview
//!
//! ```text
//!     Front end (mod_jk / mod_proxy_ajp)
//!     ──────────────────────────────────┐
//!                                       ▼
//!                              ┌─────────────────┐
//!                              │  net::listener  │  bounded accept
//!                              └────────┬────────┘
//!                                       ▼
//!                              ┌─────────────────┐
//!                              │  net::session   │  one task per connection
//!                              └────────┬────────┘
//!                  ┌────────────────────┼────────────────────┐
//!                  ▼                    ▼                    ▼
//!          protocol::request    protocol::body      protocol::response
//!                  └────────────────────┬────────────────────┘
//!                                       ▼
//!                              ┌─────────────────┐
//!                              │ service::Handler│
//!                              └─────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use ajp13_bridge::config::{load_config, validate_config, BridgeConfig, ConfigError};
use ajp13_bridge::lifecycle::{spawn_signal_handler, Shutdown};
use ajp13_bridge::net::{Listener, Server};
use ajp13_bridge::observability::{init_logging, init_metrics};
use ajp13_bridge::service::EchoHandler;

#[derive(Parser, Debug)]
#[command(name = "ajp13-bridge", version, about = "AJP13 backend bridge")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_logging(&config.observability);
    tracing::info!("ajp13-bridge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        first_request_secs = config.timeouts.first_request_secs,
        keep_alive_secs = config.timeouts.keep_alive_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = Server::new(&config, EchoHandler);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
