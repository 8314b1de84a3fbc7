//! Stop coordination for background tasks
//!
//! Each queue iterator runs its wake subscriber and reconnect watcher as
//! background tasks. A [`StopCoordinator`] fans a single stop request out to
//! all of them; dropping the coordinator counts as a stop request too, since
//! every receiver then observes a closed channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fans a stop request out to every subscribed task
#[derive(Debug)]
pub struct StopCoordinator {
    stop_tx: broadcast::Sender<()>,
    stop_requested: Arc<AtomicBool>,
}

impl StopCoordinator {
    pub fn new() -> Self {
        let (stop_tx, _) = broadcast::channel(8);
        Self {
            stop_tx,
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe a task to stop notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Request every subscribed task to stop
    pub fn trigger(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.stop_tx.send(());
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

impl Default for StopCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let coordinator = StopCoordinator::new();
        let mut rx1 = coordinator.subscribe();
        let mut rx2 = coordinator.subscribe();

        assert!(!coordinator.is_stop_requested());
        coordinator.trigger();
        assert!(coordinator.is_stop_requested());

        assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), rx2.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_closes_subscribers() {
        let coordinator = StopCoordinator::new();
        let mut rx = coordinator.subscribe();

        drop(coordinator);

        let result = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("closed channel resolves immediately");
        assert!(matches!(result, Err(broadcast::error::RecvError::Closed)));
    }
}
