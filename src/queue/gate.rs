//! Single-slot wait gate keyed by signal
//!
//! A [`BlockGate`] holds at most one pending waiter per [`Signal`]. `arm`
//! installs a waiter and returns a future; `release` resolves the current
//! waiter if there is one and is a no-op otherwise. Releases are not
//! counted: any number of releases before the waiter is resolved wake it
//! once, so a burst of notifications costs the receive loop a single poll.
//!
//! Waking is level-style. A woken caller must re-check the condition it was
//! waiting on. Arming a signal that already has a waiter drops the previous
//! waiter, which then resolves immediately; this spurious wake is harmless for
//! the same reason.
//!
//! Arm and release take the same lock, so they are atomic with respect to each
//! other on a multi-threaded runtime.

use crate::core::sync::handle_mutex_poison;
use crate::queue::error::{QueueError, QueueResult};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Signals a receive loop can wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// New data may be available on the queue
    MessageReady,
    /// The broker connection state changed
    ConnectionReady,
}

/// Reusable single-slot wait primitive
#[derive(Debug, Default)]
pub struct BlockGate {
    slots: Mutex<HashMap<Signal, oneshot::Sender<()>>>,
}

impl BlockGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a waiter for `signal`, replacing any existing one
    pub fn arm(&self, signal: Signal) -> QueueResult<GateWait> {
        let (tx, rx) = oneshot::channel();
        let mut slots = handle_mutex_poison(self.slots.lock(), synchronisation_error)?;
        if slots.insert(signal, tx).is_some() {
            log::trace!("Replaced pending {:?} waiter", signal);
        }
        Ok(GateWait { signal, rx })
    }

    /// Resolve the waiter for `signal`, returning whether one was armed
    pub fn release(&self, signal: Signal) -> QueueResult<bool> {
        let waiter = {
            let mut slots = handle_mutex_poison(self.slots.lock(), synchronisation_error)?;
            slots.remove(&signal)
        };

        // An abandoned waiter (receiver dropped) counts as not armed
        Ok(waiter.is_some_and(|tx| tx.send(()).is_ok()))
    }

    /// Whether a waiter is currently installed for `signal`
    pub fn is_armed(&self, signal: Signal) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.get(&signal).is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

fn synchronisation_error(message: String) -> QueueError {
    QueueError::Synchronisation { message }
}

/// Future returned by [`BlockGate::arm`]
///
/// Resolves when the signal is released or when the waiter is replaced by a
/// later `arm` for the same signal.
#[derive(Debug)]
#[must_use = "an armed gate does nothing unless awaited"]
pub struct GateWait {
    signal: Signal,
    rx: oneshot::Receiver<()>,
}

impl GateWait {
    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl Future for GateWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Err means the sender was replaced or the gate dropped: wake anyway
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_release_resolves_armed_waiter() {
        let gate = Arc::new(BlockGate::new());
        let wait = gate.arm(Signal::MessageReady).unwrap();

        assert!(gate.is_armed(Signal::MessageReady));
        assert!(gate.release(Signal::MessageReady).unwrap());
        assert!(timeout(Duration::from_millis(100), wait).await.is_ok());
        assert!(!gate.is_armed(Signal::MessageReady));
    }

    #[tokio::test]
    async fn test_release_without_waiter_is_noop() {
        let gate = BlockGate::new();

        assert!(!gate.release(Signal::MessageReady).unwrap());

        // The earlier release is not remembered
        let wait = gate.arm(Signal::MessageReady).unwrap();
        assert!(timeout(Duration::from_millis(50), wait).await.is_err());
    }

    #[tokio::test]
    async fn test_signals_are_independent() {
        let gate = BlockGate::new();
        let message_wait = gate.arm(Signal::MessageReady).unwrap();
        let connection_wait = gate.arm(Signal::ConnectionReady).unwrap();

        assert!(gate.release(Signal::ConnectionReady).unwrap());

        assert!(timeout(Duration::from_millis(100), connection_wait)
            .await
            .is_ok());
        assert!(timeout(Duration::from_millis(50), message_wait).await.is_err());
    }

    #[tokio::test]
    async fn test_repeated_release_wakes_once() {
        let gate = BlockGate::new();
        let wait = gate.arm(Signal::MessageReady).unwrap();

        assert!(gate.release(Signal::MessageReady).unwrap());
        assert!(!gate.release(Signal::MessageReady).unwrap());
        assert!(!gate.release(Signal::MessageReady).unwrap());

        wait.await;
        assert!(!gate.is_armed(Signal::MessageReady));
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_waiter() {
        let gate = BlockGate::new();
        let first = gate.arm(Signal::MessageReady).unwrap();
        let second = gate.arm(Signal::MessageReady).unwrap();

        // The replaced waiter resolves spuriously instead of hanging
        assert!(timeout(Duration::from_millis(100), first).await.is_ok());

        assert!(gate.release(Signal::MessageReady).unwrap());
        assert!(timeout(Duration::from_millis(100), second).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_after_waiter_dropped_reports_unarmed() {
        let gate = BlockGate::new();
        let wait = gate.arm(Signal::MessageReady).unwrap();
        drop(wait);

        assert!(!gate.is_armed(Signal::MessageReady));
        assert!(!gate.release(Signal::MessageReady).unwrap());
    }

    #[tokio::test]
    async fn test_release_from_another_task() {
        let gate = Arc::new(BlockGate::new());
        let wait = gate.arm(Signal::ConnectionReady).unwrap();

        let releaser = Arc::clone(&gate);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            releaser.release(Signal::ConnectionReady).unwrap();
        });

        assert!(timeout(Duration::from_millis(500), wait).await.is_ok());
    }
}
