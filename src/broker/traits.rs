//! Traits for the broker contract

use crate::broker::error::BrokerResult;
use crate::broker::events::{notification_channel, ConnectionEvent, RawMessage};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Command and lifecycle interface of a message broker
///
/// A single client is shared by every queue definition and iterator in a
/// process. Implementations must be cheap to call concurrently; the
/// consumption loop never issues overlapping `receive` calls for one iterator
/// but independent iterators may poll at the same time.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Key prefix used for queue storage and notification channels
    fn namespace(&self) -> &str;

    /// Channel on which this broker publishes wake notifications for `queue`
    ///
    /// Iterators subscribe to exactly this name, so an implementation that
    /// publishes elsewhere must override it.
    fn notification_channel(&self, queue: &str) -> String {
        notification_channel(self.namespace(), queue)
    }

    /// Enqueue a payload, returning the broker-assigned message id
    async fn send(&self, queue: &str, payload: &str) -> BrokerResult<String>;

    /// Non-blocking poll for the next visible message
    ///
    /// Returns `Ok(None)` when the queue currently has nothing to deliver.
    async fn receive(&self, queue: &str) -> BrokerResult<Option<RawMessage>>;

    /// Remove a delivery, returning `true` if it existed
    async fn delete(&self, queue: &str, id: &str) -> BrokerResult<bool>;

    /// Whether the main connection is currently usable
    fn is_connected(&self) -> bool;

    /// Subscribe to connection lifecycle events
    ///
    /// Callers should subscribe before reading [`BrokerClient::is_connected`]
    /// so no transition is missed between the two.
    fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Open a dedicated notification connection subscribed to `channel`
    async fn subscribe(&self, channel: &str) -> BrokerResult<Box<dyn NotificationConnection>>;
}

/// A dedicated publish/subscribe connection
#[async_trait]
pub trait NotificationConnection: Send {
    /// Wait for the next notification payload
    ///
    /// Returns `None` once the connection has been dropped by the broker.
    async fn next_notification(&mut self) -> Option<String>;

    /// Unsubscribe and release the connection
    async fn close(self: Box<Self>) -> BrokerResult<()>;
}
