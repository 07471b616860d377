//! Stopping the listener and the message router together.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Grace period used when the caller does not pass one.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// One cancellation signal observed by the HTTP server and the router loop.
///
/// Firing it stops new connections from being accepted and makes the router
/// close every live session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Not yet fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token that fires with this coordinator.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the signal. Repeated calls are harmless.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal, then join `tasks` for at most `grace`.
    ///
    /// Whatever is still running when the grace period runs out is aborted.
    pub async fn graceful_shutdown(&self, tasks: Vec<JoinHandle<()>>, grace: Option<Duration>) {
        let grace = grace.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = tasks.len(), ?grace, "shutting down");

        let abort_handles: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(grace, futures::future::join_all(tasks)).await {
            Ok(results) => {
                let failed = results.iter().filter(|r| r.is_err()).count();
                if failed > 0 {
                    warn!(failed, "tasks ended abnormally during shutdown");
                }
            }
            Err(_) => {
                warn!(?grace, "grace period elapsed, aborting remaining tasks");
                abort_handles.iter().for_each(tokio::task::AbortHandle::abort);
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unfired() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
        assert!(!coordinator.token().is_cancelled());
    }

    #[test]
    fn every_token_observes_the_signal() {
        let coordinator = ShutdownCoordinator::default();
        let listener = coordinator.token();
        let router = coordinator.token();
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
        assert!(listener.is_cancelled() && router.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_tasks_that_watch_the_token() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            let _ = done_tx.send(());
        });

        coordinator.graceful_shutdown(vec![task], None).await;
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn aborts_tasks_that_ignore_the_token() {
        let coordinator = ShutdownCoordinator::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let stubborn = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(600)).await;
            let _ = done_tx.send(());
        });

        coordinator
            .graceful_shutdown(vec![stubborn], Some(Duration::from_millis(50)))
            .await;
        assert!(done_rx.await.is_err());
    }
}
