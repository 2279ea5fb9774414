use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;

/// Background task that periodically removes connections with no inbound activity
pub struct InactivitySweeper {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl InactivitySweeper {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let timeout = self.config.inactivity_timeout();
        let mut cleanup_timer = tokio::time::interval(self.config.cleanup_interval());

        // Skip immediate first tick
        cleanup_timer.tick().await;

        tracing::info!(
            cleanup_interval_secs = self.config.cleanup_interval,
            inactivity_timeout_secs = self.config.inactivity_timeout,
            "Inactivity sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Inactivity sweeper received shutdown signal");
                    break;
                }
                _ = cleanup_timer.tick() => {
                    let removed = self.connection_manager.cleanup_inactive(timeout).await;
                    if removed > 0 {
                        tracing::info!(removed = removed, "Removed inactive connections");
                    }
                }
            }
        }

        tracing::info!("Inactivity sweeper stopped");
    }
}
