//! Graceful shutdown handling
//!
//! A single [`CancellationToken`] is the shutdown signal for every
//! background task. The same token (or a child of it) is handed to the
//! retry executor, so in-flight backoff waits end as soon as shutdown
//! starts.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Listen for OS shutdown signals (SIGTERM, SIGINT) and cancel `token`.
pub async fn listen_for_shutdown_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("📡 Received SIGINT signal (Ctrl+C)");
            }
            _ = token.cancelled() => return,
        }

        token.cancel();
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                info!("📡 Received Ctrl+C signal");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    }
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout_secs,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("🛑 Shutdown signal triggered");
            self.token.cancel();
        }
    }

    pub fn start_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            listen_for_shutdown_signals(token).await;
        });
    }

    /// Wait for shutdown, then run `cleanup` bounded by the coordinator timeout.
    pub async fn shutdown_with_cleanup<F, Fut>(&self, cleanup: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        self.token.cancelled().await;
        info!(
            "⏳ Starting graceful shutdown (timeout: {}s)...",
            self.timeout_secs
        );

        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), cleanup()).await {
            Ok(()) => {
                info!("✅ Graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!("⚠️ Graceful shutdown timed out after {}s", self.timeout_secs);
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(30)
    }
}
