//! Queue definitions: the externally visible entry point
//!
//! A [`QueueDefinition`] binds a queue name, a payload codec and a broker
//! client. It is cheap to clone and is shared by producers (`send`) and by
//! every iterator created from it (`iter`).

use crate::broker::{BrokerClient, RawMessage};
use crate::core::config::StreamSettings;
use crate::queue::codec::{JsonCodec, QueueCodec};
use crate::queue::error::QueueResult;
use crate::queue::iterator::{IteratorParts, QueueIterator};
use crate::queue::message::{Acknowledger, Delivery};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Named, typed view of a broker queue
///
/// # Example
///
/// ```rust
/// use queuestream::broker::{BrokerClient, MemoryBroker};
/// use queuestream::queue::QueueDefinition;
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Resize {
///     width: u32,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
/// let queue = QueueDefinition::<Resize>::new(broker);
/// assert_eq!(queue.queue_name(), "Resize");
///
/// let sent = queue.send(Resize { width: 640 }).await?;
///
/// let mut iter = queue.iter().await?;
/// let delivery = iter.next().await?.expect("message was sent");
/// assert_eq!(delivery.id(), sent.id());
/// assert_eq!(delivery.data(), &Resize { width: 640 });
/// delivery.acknowledge().await?;
/// iter.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct QueueDefinition<T> {
    name: String,
    broker: Arc<dyn BrokerClient>,
    codec: Arc<dyn QueueCodec<T>>,
    settings: StreamSettings,
}

impl<T> Clone for QueueDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            broker: Arc::clone(&self.broker),
            codec: Arc::clone(&self.codec),
            settings: self.settings.clone(),
        }
    }
}

impl<T> QueueDefinition<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Define a JSON-encoded queue named after `T`
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self::with_codec(broker, JsonCodec)
    }
}

impl<T> QueueDefinition<T>
where
    T: Send + 'static,
{
    /// Define a queue named after `T` with a custom codec
    pub fn with_codec(broker: Arc<dyn BrokerClient>, codec: impl QueueCodec<T> + 'static) -> Self {
        Self {
            name: short_type_name::<T>(),
            broker,
            codec: Arc::new(codec),
            settings: StreamSettings::default(),
        }
    }

    /// Override the queue name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Name of the realtime channel iterators subscribe to
    pub fn notification_channel(&self) -> String {
        self.broker.notification_channel(&self.name)
    }

    /// Serialize and enqueue a message
    ///
    /// The returned delivery carries the broker id and can delete the message
    /// again, mirroring what an iterator hands to consumers.
    pub async fn send(&self, data: T) -> QueueResult<Delivery<T>> {
        let payload = self.codec.serialize(&self.name, &data)?;
        let id = self.broker.send(&self.name, &payload).await?;
        log::trace!("Sent {} to queue '{}'", id, self.name);

        let acknowledger = Acknowledger::new(Arc::clone(&self.broker), self.name.clone(), id.clone());
        Ok(Delivery::new(data, RawMessage { id, payload }, acknowledger))
    }

    /// Start iterating the queue
    pub async fn iter(&self) -> QueueResult<QueueIterator<T>> {
        let parts = IteratorParts {
            queue: self.name.clone(),
            channel: self.notification_channel(),
            broker: Arc::clone(&self.broker),
            codec: Arc::clone(&self.codec),
            reconnect_margin: self.settings.reconnect_margin(),
        };
        Ok(QueueIterator::start(parts).await)
    }
}

/// Extension trait for defining queues straight from a broker handle
pub trait BrokerQueueExt {
    /// Define a JSON-encoded queue with an explicit name
    fn queue<T>(&self, name: &str) -> QueueDefinition<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static;
}

impl BrokerQueueExt for Arc<dyn BrokerClient> {
    fn queue<T>(&self, name: &str) -> QueueDefinition<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        QueueDefinition::new(Arc::clone(self)).with_name(name)
    }
}

/// Last path segment of a type name, without generic arguments
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
