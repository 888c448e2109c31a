//! Accept loop and session dispatch.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Spawn one session task per connection
//! - Stop accepting on shutdown and drain live sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::BridgeConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Accepted, Listener, ListenerError};
use crate::net::session::{Session, SessionSettings};
use crate::service::Handler;

/// Serves the AJP13 protocol for every accepted connection.
pub struct Server<H> {
    handler: Arc<H>,
    settings: SessionSettings,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl<H: Handler> Server<H> {
    pub fn new(config: &BridgeConfig, handler: H) -> Self {
        Self::with_settings(
            Arc::new(handler),
            SessionSettings::from_config(config),
            Duration::from_secs(config.timeouts.drain_secs),
        )
    }

    pub fn with_settings(handler: Arc<H>, settings: SessionSettings, drain_timeout: Duration) -> Self {
        Self {
            handler,
            settings,
            drain_timeout,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Handle on the live-connection count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run the accept loop until `shutdown` fires, then drain.
    pub async fn run(
        &self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => self.spawn_session(accepted),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            busy_slots = listener.capacity() - listener.free_slots(),
            drain_timeout = ?self.drain_timeout,
            "Stopped accepting, draining sessions"
        );
        drop(listener);
        if !self.tracker.wait_for_shutdown(self.drain_timeout).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain deadline passed with sessions still open"
            );
        }
        Ok(())
    }

    fn spawn_session(&self, accepted: Accepted) {
        let Accepted { stream, peer, permit } = accepted;
        let guard = self.tracker.track();
        let id = guard.id();
        let session = Session::new(id, stream, Arc::clone(&self.handler), self.settings.clone());
        let span = tracing::info_span!("session", connection_id = %id, peer_addr = %peer);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match session.run().await {
                    Ok(end) => tracing::debug!(reason = ?end, "Connection finished"),
                    Err(e) => tracing::warn!(error = %e, kind = e.kind(), "Connection closed on error"),
                }
            }
            .instrument(span),
        );
    }
}
