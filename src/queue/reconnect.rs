//! Reconnect Watcher
//!
//! Tracks the broker's connection state from its lifecycle events and drives
//! the connection-ready gate of one iterator.
//!
//! ```text
//!            Reconnecting{delay, backoff}
//!  Connected ───────────────────────────▶ ReconnectDelay ──timer──▶ Connecting
//!      ▲                                       │                        │
//!      └────────────── Connect ────────────────┴────────────────────────┘
//!
//!  any ── End{permanent: true} / lifecycle closed ──▶ Closed (terminal)
//! ```
//!
//! The transition logic lives in [`ConnectionStateMachine`], which has no I/O
//! and returns the [`WatcherAction`]s to perform. [`ReconnectWatcher`] runs it
//! in a background task and applies the actions.

use crate::broker::{BrokerClient, ConnectionEvent};
use crate::core::sync::handle_mutex_poison;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::gate::{BlockGate, Signal};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

/// Connection state as observed through lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The main connection closed; the broker has not announced a retry yet
    Disconnected,
    /// The backoff window elapsed; waiting for the broker's `Connect`
    Connecting,
    /// Commands can be issued
    Connected,
    /// The broker announced a retry and its backoff window is running
    ReconnectDelay,
    /// The broker is gone for good
    Closed,
}

/// Side effects requested by a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherAction {
    /// Start the backoff timer, replacing any running one
    ScheduleTimer(Duration),
    CancelTimer,
    /// Release the connection-ready gate
    ReleaseConnection,
    /// Release the message-ready gate so a parked loop re-checks its state
    WakeReceiver,
}

/// Pure connection state machine
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    margin: Duration,
    last_delay: Option<Duration>,
    last_backoff: Option<f64>,
}

impl ConnectionStateMachine {
    pub fn new(connected: bool, margin: Duration) -> Self {
        Self {
            state: if connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            },
            margin,
            last_delay: None,
            last_backoff: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay and backoff from the most recent `Reconnecting` event
    pub fn last_reconnect(&self) -> Option<(Duration, f64)> {
        self.last_delay.zip(self.last_backoff)
    }

    pub fn on_event(&mut self, event: &ConnectionEvent) -> Vec<WatcherAction> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }

        match event {
            ConnectionEvent::Connect => {
                self.state = ConnectionState::Connected;
                vec![
                    WatcherAction::CancelTimer,
                    WatcherAction::ReleaseConnection,
                    WatcherAction::WakeReceiver,
                ]
            }
            ConnectionEvent::Reconnecting { delay, backoff } => {
                self.state = ConnectionState::ReconnectDelay;
                self.last_delay = Some(*delay);
                self.last_backoff = Some(*backoff);
                vec![WatcherAction::ScheduleTimer(backoff_window(
                    *delay,
                    *backoff,
                    self.margin,
                ))]
            }
            ConnectionEvent::End { permanent: false } => {
                self.state = ConnectionState::Disconnected;
                Vec::new()
            }
            ConnectionEvent::End { permanent: true } => self.close(),
        }
    }

    /// The backoff timer elapsed
    pub fn on_timer_fired(&mut self) -> Vec<WatcherAction> {
        if self.state != ConnectionState::ReconnectDelay {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        vec![WatcherAction::WakeReceiver]
    }

    /// The lifecycle channel closed: no further events will ever arrive
    pub fn on_lifecycle_closed(&mut self) -> Vec<WatcherAction> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        self.close()
    }

    fn close(&mut self) -> Vec<WatcherAction> {
        self.state = ConnectionState::Closed;
        vec![
            WatcherAction::CancelTimer,
            WatcherAction::ReleaseConnection,
            WatcherAction::WakeReceiver,
        ]
    }
}

/// `delay × backoff + margin`, treating a nonsensical backoff as 1
pub fn backoff_window(delay: Duration, backoff: f64, margin: Duration) -> Duration {
    let factor = if backoff.is_finite() && backoff >= 0.0 {
        backoff
    } else {
        1.0
    };
    delay.mul_f64(factor) + margin
}

/// Background task applying [`ConnectionStateMachine`] to one iterator's gate
pub struct ReconnectWatcher {
    machine: Arc<Mutex<ConnectionStateMachine>>,
    handle: Option<JoinHandle<()>>,
}

impl ReconnectWatcher {
    /// Subscribe to the broker's lifecycle and start watching
    ///
    /// The initial state is read after subscribing, so a transition racing
    /// construction is still delivered as an event.
    pub fn spawn(
        broker: Arc<dyn BrokerClient>,
        gate: Arc<BlockGate>,
        margin: Duration,
        stop_rx: broadcast::Receiver<()>,
        queue: String,
    ) -> Self {
        let lifecycle = broker.lifecycle();
        let machine = Arc::new(Mutex::new(ConnectionStateMachine::new(
            broker.is_connected(),
            margin,
        )));

        let task = WatcherTask {
            broker,
            gate,
            machine: Arc::clone(&machine),
            queue,
            timer: None,
        };
        let handle = tokio::spawn(task.run(lifecycle, stop_rx));

        Self {
            machine,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> QueueResult<ConnectionState> {
        let machine = handle_mutex_poison(self.machine.lock(), synchronisation_error)?;
        Ok(machine.state())
    }

    /// Wait for the watcher task to finish after a stop request
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Reconnect watcher task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ReconnectWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct WatcherTask {
    broker: Arc<dyn BrokerClient>,
    gate: Arc<BlockGate>,
    machine: Arc<Mutex<ConnectionStateMachine>>,
    queue: String,
    timer: Option<Pin<Box<Sleep>>>,
}

impl WatcherTask {
    async fn run(
        mut self,
        mut lifecycle: broadcast::Receiver<ConnectionEvent>,
        mut stop_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                event = lifecycle.recv() => {
                    let actions = match event {
                        Ok(event) => {
                            log::debug!("Queue '{}' observed broker event {:?}", self.queue, event);
                            self.transition(|machine| machine.on_event(&event))
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!(
                                "Queue '{}' missed {} broker events; resynchronising",
                                self.queue,
                                skipped
                            );
                            if self.broker.is_connected() {
                                self.transition(|machine| machine.on_event(&ConnectionEvent::Connect))
                            } else {
                                Vec::new()
                            }
                        }
                        Err(RecvError::Closed) => {
                            self.transition(ConnectionStateMachine::on_lifecycle_closed)
                        }
                    };
                    self.apply(actions);
                }
                _ = wait_for_timer(&mut self.timer) => {
                    self.timer = None;
                    let actions = self.transition(ConnectionStateMachine::on_timer_fired);
                    self.apply(actions);
                }
            }

            if self.current_state() == Some(ConnectionState::Closed) {
                log::debug!("Queue '{}' broker connection closed permanently", self.queue);
                break;
            }
        }
    }

    fn transition(
        &self,
        step: impl FnOnce(&mut ConnectionStateMachine) -> Vec<WatcherAction>,
    ) -> Vec<WatcherAction> {
        match self.machine.lock() {
            Ok(mut machine) => {
                let before = machine.state();
                let actions = step(&mut *machine);
                if machine.state() != before {
                    log::debug!(
                        "Queue '{}' connection state {:?} -> {:?}",
                        self.queue,
                        before,
                        machine.state()
                    );
                }
                actions
            }
            Err(e) => {
                log::error!("Connection state lock poisoned for queue '{}': {}", self.queue, e);
                Vec::new()
            }
        }
    }

    fn current_state(&self) -> Option<ConnectionState> {
        self.machine.lock().ok().map(|machine| machine.state())
    }

    fn apply(&mut self, actions: Vec<WatcherAction>) {
        for action in actions {
            match action {
                WatcherAction::ScheduleTimer(window) => {
                    log::debug!(
                        "Queue '{}' re-checking connection in {:?}",
                        self.queue,
                        window
                    );
                    self.timer = Some(Box::pin(tokio::time::sleep(window)));
                }
                WatcherAction::CancelTimer => self.timer = None,
                WatcherAction::ReleaseConnection => self.release(Signal::ConnectionReady),
                WatcherAction::WakeReceiver => self.release(Signal::MessageReady),
            }
        }
    }

    fn release(&self, signal: Signal) {
        if let Err(e) = self.gate.release(signal) {
            log::warn!("Queue '{}' failed to release {:?}: {}", self.queue, signal, e);
        }
    }
}

async fn wait_for_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

fn synchronisation_error(message: String) -> QueueError {
    QueueError::Synchronisation { message }
}
