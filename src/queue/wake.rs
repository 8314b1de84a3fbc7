//! Wake Subscriber
//!
//! Keeps a dedicated notification connection subscribed to a queue's realtime
//! channel and turns every notification into a release of the message-ready
//! gate. Notification payloads are ignored.
//!
//! The connection follows the main broker connection: it is closed on `End`,
//! reopened on the next `Connect`, and closed for good on a stop request or
//! a permanent end. Failures here never reach the consumer; at worst a wake
//! is delayed until the next reconnect.

use crate::broker::{BrokerClient, ConnectionEvent, NotificationConnection};
use crate::core::error_handling::log_error_with_context;
use crate::queue::gate::{BlockGate, Signal};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

pub struct WakeSubscriber {
    channel: String,
    handle: Option<JoinHandle<()>>,
}

impl WakeSubscriber {
    /// Open the notification connection (when connected) and start listening
    ///
    /// The first subscription happens before this returns, so a message sent
    /// after the iterator is created always produces a wake.
    pub async fn start(
        broker: Arc<dyn BrokerClient>,
        channel: String,
        gate: Arc<BlockGate>,
        stop_rx: broadcast::Receiver<()>,
    ) -> Self {
        let lifecycle = broker.lifecycle();

        let mut task = SubscriberTask {
            broker,
            channel: channel.clone(),
            gate,
            connection: None,
        };
        if task.broker.is_connected() {
            task.open().await;
        } else {
            log::debug!(
                "Broker not connected; deferring subscription to '{}'",
                channel
            );
        }

        let handle = tokio::spawn(task.run(lifecycle, stop_rx));
        Self {
            channel,
            handle: Some(handle),
        }
    }

    /// The realtime channel this subscriber listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the subscriber to close its connection after a stop request
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Wake subscriber for '{}' ended abnormally: {}", self.channel, e);
            }
        }
    }
}

struct SubscriberTask {
    broker: Arc<dyn BrokerClient>,
    channel: String,
    gate: Arc<BlockGate>,
    connection: Option<Box<dyn NotificationConnection>>,
}

impl SubscriberTask {
    async fn run(
        mut self,
        mut lifecycle: broadcast::Receiver<ConnectionEvent>,
        mut stop_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                event = lifecycle.recv() => match event {
                    Ok(ConnectionEvent::Connect) => self.resubscribe().await,
                    Ok(ConnectionEvent::End { permanent }) => {
                        self.close().await;
                        if permanent {
                            break;
                        }
                    }
                    Ok(ConnectionEvent::Reconnecting { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "Wake subscriber for '{}' missed {} broker events",
                            self.channel,
                            skipped
                        );
                        if self.broker.is_connected() {
                            self.resubscribe().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                notification = next_notification(&mut self.connection) => match notification {
                    Some(_) => self.wake(),
                    None => {
                        log::debug!("Notification connection for '{}' dropped", self.channel);
                        self.close().await;
                    }
                },
            }
        }

        self.close().await;
        log::trace!("Wake subscriber for '{}' stopped", self.channel);
    }

    async fn open(&mut self) -> bool {
        match self.broker.subscribe(&self.channel).await {
            Ok(connection) => {
                log::debug!("Subscribed to '{}'", self.channel);
                self.connection = Some(connection);
                true
            }
            Err(e) => {
                log_error_with_context(&e, &format!("Subscribing to '{}'", self.channel));
                false
            }
        }
    }

    /// Reopen after a reconnect, waking the loop for anything sent meanwhile
    async fn resubscribe(&mut self) {
        if self.connection.is_some() {
            return;
        }
        if self.open().await {
            self.wake();
        }
    }

    async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                log::warn!(
                    "Error closing notification connection for '{}': {}",
                    self.channel,
                    e
                );
            }
        }
    }

    fn wake(&self) {
        if let Err(e) = self.gate.release(Signal::MessageReady) {
            log::warn!("Failed to wake receiver for '{}': {}", self.channel, e);
        }
    }
}

async fn next_notification(
    connection: &mut Option<Box<dyn NotificationConnection>>,
) -> Option<String> {
    match connection.as_mut() {
        Some(connection) => connection.next_notification().await,
        None => std::future::pending().await,
    }
}
