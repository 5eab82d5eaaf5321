//! Graceful Shutdown Handler
//!
//! Coordinates process shutdown between the signal handler, the mirror set
//! and the background tasks that consume its events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Shutdown coordinator.
///
/// Broadcasts the shutdown signal and tracks background tasks so the
/// process can wait for them to finish draining.
#[derive(Clone)]
pub struct ShutdownController {
    initiated: Arc<AtomicBool>,
    active_tasks: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
    drained: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            initiated: Arc::new(AtomicBool::new(false)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            drained: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiate shutdown. Only the first call broadcasts.
    pub fn shutdown(&self) {
        if !self.initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating graceful shutdown");
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Register a background task. The task is counted until the guard drops.
    pub fn task_guard(&self) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: self.clone(),
        }
    }

    fn task_finished(&self) {
        if self.active_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every registered task has finished, up to `timeout`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = self.drained.notified();
        tokio::pin!(drained);
        // Register interest before checking the count so a wakeup is not lost.
        drained.as_mut().enable();
        if self.active_tasks() == 0 {
            return true;
        }

        tokio::select! {
            _ = drained => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!("drain timeout: {} tasks still running", self.active_tasks());
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII registration of a background task.
pub struct TaskGuard {
    controller: ShutdownController,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.task_finished();
    }
}

/// Resolve when Ctrl+C or SIGTERM arrives, then initiate shutdown.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_controller_new() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert_eq!(controller.active_tasks(), 0);
    }

    #[test]
    fn test_shutdown_initiates_once() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();

        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_shutdown());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_task_guards_are_counted() {
        let controller = ShutdownController::new();

        let first = controller.task_guard();
        let second = controller.task_guard();
        assert_eq!(controller.active_tasks(), 2);

        drop(first);
        assert_eq!(controller.active_tasks(), 1);
        drop(second);
        assert_eq!(controller.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_drain_immediate() {
        let controller = ShutdownController::new();
        controller.shutdown();
        assert!(controller.wait_for_drain(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_task_stops_on_broadcast_and_drains() {
        let controller = ShutdownController::new();
        let guard = controller.task_guard();
        let mut rx = controller.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            let _ = rx.recv().await;
        });

        controller.shutdown();
        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_drain_timeout() {
        let controller = ShutdownController::new();
        let _guard = controller.task_guard();
        controller.shutdown();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
    }
}
