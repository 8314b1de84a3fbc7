//! In-process broker with visibility timeouts and realtime notifications
//!
//! This module provides a complete [`BrokerClient`] implementation backed by
//! process memory:
//! - Per-queue FIFO storage with monotonic sequence-based ids
//! - Visibility timeouts: a received message stays hidden until it is deleted
//!   or its timeout elapses, after which it is delivered again
//! - Realtime notifications published on `"<namespace><marker><queue>"` for every
//!   send, the marker defaulting to `rt:`
//! - Simulated connection loss, reconnect and permanent shutdown

use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::events::{notification_channel_with_marker, ConnectionEvent, RawMessage};
use crate::broker::traits::{BrokerClient, NotificationConnection};
use crate::core::config::MemoryBrokerSettings;
use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const MAX_QUEUE_NAME_LENGTH: usize = 160;
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Stored message with delivery bookkeeping
#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    payload: String,
    /// `None` while visible; otherwise the instant the message reappears
    hidden_until: Option<Instant>,
    receive_count: u32,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        match self.hidden_until {
            None => true,
            Some(deadline) => deadline <= now,
        }
    }
}

/// Counters describing broker activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerStats {
    /// Messages accepted by `send`
    pub sent: u64,
    /// Messages handed out by `receive`
    pub received: u64,
    /// Deliveries removed by `delete`
    pub deleted: u64,
    /// Total `receive` invocations, including empty and failed ones
    pub receive_calls: u64,
    /// `receive` invocations that found nothing to deliver
    pub empty_receives: u64,
    /// Notification connections currently subscribed
    pub notification_connections: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    deleted: AtomicU64,
    receive_calls: AtomicU64,
    empty_receives: AtomicU64,
}

struct Subscription {
    connection_id: u64,
    sender: UnboundedSender<String>,
}

struct BrokerInner {
    namespace: String,
    notification_marker: String,
    visibility_timeout: Duration,
    max_message_size: usize,
    next_sequence: AtomicU64,
    next_connection_id: AtomicU64,
    queues: RwLock<HashMap<String, VecDeque<StoredMessage>>>,
    channels: Mutex<HashMap<String, Vec<Subscription>>>,
    connected: AtomicBool,
    lifecycle_tx: broadcast::Sender<ConnectionEvent>,
    counters: Counters,
}

/// In-process message broker
///
/// Cloning a `MemoryBroker` yields another handle to the same broker, so a
/// test can keep one handle for simulating outages while the queue code owns
/// another as `Arc<dyn BrokerClient>`.
///
/// # Example
///
/// ```rust
/// use queuestream::broker::{BrokerClient, MemoryBroker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = MemoryBroker::new();
/// let id = broker.send("jobs", "{\"v\":1}").await?;
///
/// let message = broker.receive("jobs").await?.expect("message is visible");
/// assert_eq!(message.id, id);
/// assert!(broker.delete("jobs", &id).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a connected broker with default settings
    pub fn new() -> Self {
        Self::from_settings(&MemoryBrokerSettings::default())
    }

    /// Create a connected broker from configuration
    pub fn from_settings(settings: &MemoryBrokerSettings) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BrokerInner {
                namespace: settings.namespace.clone(),
                notification_marker: settings.notification_marker.clone(),
                visibility_timeout: Duration::from_millis(settings.visibility_timeout_ms),
                max_message_size: settings.max_message_size,
                next_sequence: AtomicU64::new(1),
                next_connection_id: AtomicU64::new(1),
                queues: RwLock::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(true),
                lifecycle_tx,
                counters: Counters::default(),
            }),
        }
    }

    /// Create the queue if it does not exist yet, returning whether it was created
    pub fn create_queue(&self, queue: &str) -> BrokerResult<bool> {
        validate_queue_name(queue)?;
        let mut queues = handle_rwlock_write(self.inner.queues.write(), command_error)?;
        if queues.contains_key(queue) {
            return Ok(false);
        }
        queues.insert(queue.to_string(), VecDeque::new());
        Ok(true)
    }

    /// Remove a queue and every message it holds
    pub fn delete_queue(&self, queue: &str) -> BrokerResult<usize> {
        let mut queues = handle_rwlock_write(self.inner.queues.write(), command_error)?;
        queues
            .remove(queue)
            .map(|messages| messages.len())
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue: queue.to_string(),
            })
    }

    /// Number of messages stored in a queue, visible or in flight
    pub fn queue_len(&self, queue: &str) -> BrokerResult<usize> {
        let queues = handle_rwlock_read(self.inner.queues.read(), command_error)?;
        queues
            .get(queue)
            .map(|messages| messages.len())
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue: queue.to_string(),
            })
    }

    /// Number of received-but-unacknowledged messages still hidden
    pub fn in_flight(&self, queue: &str) -> BrokerResult<usize> {
        let now = Instant::now();
        let queues = handle_rwlock_read(self.inner.queues.read(), command_error)?;
        Ok(queues
            .get(queue)
            .map(|messages| messages.iter().filter(|m| !m.is_visible(now)).count())
            .unwrap_or(0))
    }

    /// How many times a message has been handed out
    pub fn receive_count(&self, queue: &str, id: &str) -> Option<u32> {
        let queues = self.inner.queues.read().ok()?;
        queues
            .get(queue)?
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.receive_count)
    }

    /// Publish a payload-free wake signal for a queue without storing a message
    pub fn notify(&self, queue: &str) -> BrokerResult<usize> {
        self.inner.publish(&self.inner.channel_for(queue), "")
    }

    /// Simulate losing the main connection
    ///
    /// Emits `End { permanent: false }` followed by `Reconnecting`. Commands
    /// fail with [`BrokerError::NotConnected`] and every notification
    /// connection is dropped until [`MemoryBroker::reconnect`] is called.
    pub fn disconnect(&self, delay: Duration, backoff: f64) {
        log::debug!(
            "Memory broker disconnecting (delay: {:?}, backoff: {})",
            delay,
            backoff
        );
        self.inner.connected.store(false, Ordering::Release);
        self.inner.drop_subscriptions();
        self.inner.emit(ConnectionEvent::End { permanent: false });
        self.inner
            .emit(ConnectionEvent::Reconnecting { delay, backoff });
    }

    /// Emit an additional `Reconnecting` event while disconnected
    pub fn reconnect_attempt(&self, delay: Duration, backoff: f64) {
        self.inner
            .emit(ConnectionEvent::Reconnecting { delay, backoff });
    }

    /// Simulate the main connection coming back
    pub fn reconnect(&self) {
        log::debug!("Memory broker reconnected");
        self.inner.connected.store(true, Ordering::Release);
        self.inner.emit(ConnectionEvent::Connect);
    }

    /// Simulate the broker going away for good
    pub fn shutdown(&self) {
        log::debug!("Memory broker shut down permanently");
        self.inner.connected.store(false, Ordering::Release);
        self.inner.drop_subscriptions();
        self.inner.emit(ConnectionEvent::End { permanent: true });
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> BrokerStats {
        let counters = &self.inner.counters;
        let notification_connections = self
            .inner
            .channels
            .lock()
            .map(|channels| channels.values().map(Vec::len).sum::<usize>())
            .unwrap_or(0);

        BrokerStats {
            sent: counters.sent.load(Ordering::Relaxed),
            received: counters.received.load(Ordering::Relaxed),
            deleted: counters.deleted.load(Ordering::Relaxed),
            receive_calls: counters.receive_calls.load(Ordering::Relaxed),
            empty_receives: counters.empty_receives.load(Ordering::Relaxed),
            notification_connections,
        }
    }

    fn ensure_connected(&self) -> BrokerResult<()> {
        if self.inner.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

impl BrokerInner {
    fn channel_for(&self, queue: &str) -> String {
        notification_channel_with_marker(&self.namespace, &self.notification_marker, queue)
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine: nobody is iterating yet
        let _ = self.lifecycle_tx.send(event);
    }

    fn publish(&self, channel: &str, payload: &str) -> BrokerResult<usize> {
        let mut channels = handle_mutex_poison(self.channels.lock(), command_error)?;
        let Some(subscriptions) = channels.get_mut(channel) else {
            return Ok(0);
        };

        subscriptions.retain(|sub| sub.sender.send(payload.to_string()).is_ok());
        let delivered = subscriptions.len();
        if subscriptions.is_empty() {
            channels.remove(channel);
        }
        Ok(delivered)
    }

    fn drop_subscriptions(&self) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.clear();
        }
    }

    fn unsubscribe(&self, channel: &str, connection_id: u64) {
        if let Ok(mut channels) = self.channels.lock() {
            if let Some(subscriptions) = channels.get_mut(channel) {
                subscriptions.retain(|sub| sub.connection_id != connection_id);
                if subscriptions.is_empty() {
                    channels.remove(channel);
                }
            }
        }
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    fn notification_channel(&self, queue: &str) -> String {
        self.inner.channel_for(queue)
    }

    async fn send(&self, queue: &str, payload: &str) -> BrokerResult<String> {
        self.ensure_connected()?;
        validate_queue_name(queue)?;
        if payload.len() > self.inner.max_message_size {
            return Err(BrokerError::MessageTooLarge {
                queue: queue.to_string(),
                size: payload.len(),
                max_size: self.inner.max_message_size,
            });
        }

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("msg-{sequence:010}");
        {
            let mut queues = handle_rwlock_write(self.inner.queues.write(), command_error)?;
            queues
                .entry(queue.to_string())
                .or_default()
                .push_back(StoredMessage {
                    id: id.clone(),
                    payload: payload.to_string(),
                    hidden_until: None,
                    receive_count: 0,
                });
        }
        self.inner.counters.sent.fetch_add(1, Ordering::Relaxed);

        let channel = self.inner.channel_for(queue);
        let notified = self.inner.publish(&channel, &id)?;
        log::trace!("Sent {} to queue '{}' ({} subscribers notified)", id, queue, notified);

        Ok(id)
    }

    async fn receive(&self, queue: &str) -> BrokerResult<Option<RawMessage>> {
        self.inner
            .counters
            .receive_calls
            .fetch_add(1, Ordering::Relaxed);
        self.ensure_connected()?;
        validate_queue_name(queue)?;

        let now = Instant::now();
        let delivered = {
            let mut queues = handle_rwlock_write(self.inner.queues.write(), command_error)?;
            let messages = queues.entry(queue.to_string()).or_default();
            messages.iter_mut().find(|m| m.is_visible(now)).map(|m| {
                m.hidden_until = Some(now + self.inner.visibility_timeout);
                m.receive_count += 1;
                RawMessage::new(m.id.clone(), m.payload.clone())
            })
        };

        match &delivered {
            Some(message) => {
                self.inner.counters.received.fetch_add(1, Ordering::Relaxed);
                log::trace!("Delivered {} from queue '{}'", message.id, queue);
            }
            None => {
                self.inner
                    .counters
                    .empty_receives
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(delivered)
    }

    async fn delete(&self, queue: &str, id: &str) -> BrokerResult<bool> {
        self.ensure_connected()?;
        validate_queue_name(queue)?;

        let mut queues = handle_rwlock_write(self.inner.queues.write(), command_error)?;
        let Some(messages) = queues.get_mut(queue) else {
            return Ok(false);
        };

        let before = messages.len();
        messages.retain(|m| m.id != id);
        let removed = messages.len() < before;
        if removed {
            self.inner.counters.deleted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.lifecycle_tx.subscribe()
    }

    async fn subscribe(&self, channel: &str) -> BrokerResult<Box<dyn NotificationConnection>> {
        self.ensure_connected()?;

        let connection_id = self.inner.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = unbounded_channel();
        {
            let mut channels = handle_mutex_poison(self.inner.channels.lock(), command_error)?;
            channels
                .entry(channel.to_string())
                .or_default()
                .push(Subscription {
                    connection_id,
                    sender,
                });
        }
        log::trace!(
            "Notification connection {} subscribed to '{}'",
            connection_id,
            channel
        );

        Ok(Box::new(MemoryNotificationConnection {
            connection_id,
            channel: channel.to_string(),
            receiver,
            broker: Arc::downgrade(&self.inner),
        }))
    }
}

/// Notification connection handed out by [`MemoryBroker::subscribe`]
struct MemoryNotificationConnection {
    connection_id: u64,
    channel: String,
    receiver: UnboundedReceiver<String>,
    broker: Weak<BrokerInner>,
}

#[async_trait]
impl NotificationConnection for MemoryNotificationConnection {
    async fn next_notification(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(&self.channel, self.connection_id);
        }
        log::trace!(
            "Notification connection {} closed ('{}')",
            self.connection_id,
            self.channel
        );
        Ok(())
    }
}

fn command_error(message: String) -> BrokerError {
    BrokerError::Command { message }
}

fn validate_queue_name(queue: &str) -> BrokerResult<()> {
    if queue.is_empty() || queue.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(BrokerError::InvalidQueueName {
            queue: queue.to_string(),
            reason: format!("queue names must be 1-{MAX_QUEUE_NAME_LENGTH} characters long"),
        });
    }
    if !queue
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(BrokerError::InvalidQueueName {
            queue: queue.to_string(),
            reason: "queue names may only contain alphanumerics, '-' and '_'".to_string(),
        });
    }
    Ok(())
}
