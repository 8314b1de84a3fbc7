//! Receive loop: the push-style iterator over a queue
//!
//! Each call to [`QueueIterator::next`] runs:
//!
//! 1. wait until the reconnect watcher reports the broker connected
//! 2. arm the message-ready gate
//! 3. issue one non-blocking `receive`
//! 4. on a message, decode it and return it with its acknowledgement handle
//! 5. otherwise wait on the gate armed in step 2 and start over
//!
//! Arming before polling means a notification that lands between an empty
//! `receive` and the wait still resolves the wait, so wakes are not lost.
//! Bursts of notifications while the loop is busy collapse into one extra
//! poll because the gate does not count releases.
//!
//! Transient disconnects only suspend the loop. The sequence ends (`Ok(None)`)
//! only after a stop request; a permanently closed broker yields
//! [`QueueError::ConnectionClosed`] on every further call.

use crate::broker::BrokerClient;
use crate::core::shutdown::StopCoordinator;
use crate::queue::codec::QueueCodec;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::gate::{BlockGate, Signal};
use crate::queue::message::{Acknowledger, Delivery};
use crate::queue::reconnect::{ConnectionState, ReconnectWatcher};
use crate::queue::wake::WakeSubscriber;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;

/// Everything an iterator needs from its queue definition
pub(crate) struct IteratorParts<T> {
    pub queue: String,
    pub channel: String,
    pub broker: Arc<dyn BrokerClient>,
    pub codec: Arc<dyn QueueCodec<T>>,
    pub reconnect_margin: Duration,
}

/// Asynchronous sequence of messages from one queue
///
/// Created by [`crate::queue::QueueDefinition::iter`]. Owns a dedicated
/// notification connection; call [`QueueIterator::stop`] to close it
/// deterministically. Dropping the iterator also requests a stop, but the
/// connection is then closed in the background.
///
/// `next()` is cancel-safe in the at-least-once sense: if its future is
/// dropped after the broker handed out a message, that message is redelivered
/// once the broker's visibility timeout expires.
///
/// # Example
///
/// ```rust,no_run
/// use queuestream::broker::{BrokerClient, MemoryBroker};
/// use queuestream::queue::QueueDefinition;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
/// let jobs = QueueDefinition::<serde_json::Value>::new(broker).with_name("jobs");
///
/// let mut iter = jobs.iter().await?;
/// while let Some(delivery) = iter.next().await? {
///     println!("job: {}", delivery.data());
///     delivery.acknowledge().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct QueueIterator<T> {
    queue: String,
    broker: Arc<dyn BrokerClient>,
    codec: Arc<dyn QueueCodec<T>>,
    gate: Arc<BlockGate>,
    subscriber: WakeSubscriber,
    watcher: ReconnectWatcher,
    stop: Arc<StopCoordinator>,
    stopped: bool,
}

impl<T> QueueIterator<T>
where
    T: Send + 'static,
{
    pub(crate) async fn start(parts: IteratorParts<T>) -> Self {
        let IteratorParts {
            queue,
            channel,
            broker,
            codec,
            reconnect_margin,
        } = parts;

        let gate = Arc::new(BlockGate::new());
        let stop = Arc::new(StopCoordinator::new());

        let watcher = ReconnectWatcher::spawn(
            Arc::clone(&broker),
            Arc::clone(&gate),
            reconnect_margin,
            stop.subscribe(),
            queue.clone(),
        );
        let subscriber = WakeSubscriber::start(
            Arc::clone(&broker),
            channel,
            Arc::clone(&gate),
            stop.subscribe(),
        )
        .await;

        log::debug!(
            "Started iterator for queue '{}' (notifications on '{}')",
            queue,
            subscriber.channel()
        );

        Self {
            queue,
            broker,
            codec,
            gate,
            subscriber,
            watcher,
            stop,
            stopped: false,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Connection state as currently seen by this iterator
    pub fn connection_state(&self) -> QueueResult<ConnectionState> {
        self.watcher.state()
    }

    /// A handle that can stop this iterator from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            gate: Arc::clone(&self.gate),
        }
    }

    /// Wait for and return the next message
    ///
    /// Returns `Ok(None)` once the iterator has been stopped. Broker command
    /// failures and undecodable payloads are returned as errors without
    /// ending the sequence; the undecodable message stays unacknowledged.
    pub async fn next(&mut self) -> QueueResult<Option<Delivery<T>>> {
        loop {
            if self.stop.is_stop_requested() {
                return Ok(None);
            }
            if !self.await_connection().await? {
                return Ok(None);
            }

            let wake = self.gate.arm(Signal::MessageReady)?;
            if let Some(raw) = self.broker.receive(&self.queue).await? {
                log::trace!("Received {} from queue '{}'", raw.id, self.queue);
                let data = self.codec.deserialize(&self.queue, &raw.payload)?;
                let acknowledger =
                    Acknowledger::new(Arc::clone(&self.broker), self.queue.clone(), raw.id.clone());
                return Ok(Some(Delivery::new(data, raw, acknowledger)));
            }

            // A stop requested after arming releases the gate; one requested before
            // it must be seen here
            if self.stop.is_stop_requested() {
                return Ok(None);
            }
            log::trace!("Queue '{}' empty; waiting for a notification", self.queue);
            wake.await;
        }
    }

    /// Park until connected; `Ok(false)` when stopped while waiting
    async fn await_connection(&self) -> QueueResult<bool> {
        loop {
            let ready = self.gate.arm(Signal::ConnectionReady)?;
            if self.stop.is_stop_requested() {
                return Ok(false);
            }
            match self.watcher.state()? {
                ConnectionState::Connected => return Ok(true),
                ConnectionState::Closed => {
                    return Err(QueueError::ConnectionClosed {
                        queue: self.queue.clone(),
                    })
                }
                state => {
                    log::debug!(
                        "Queue '{}' waiting for broker connection ({:?})",
                        self.queue,
                        state
                    );
                    ready.await;
                }
            }
        }
    }

    /// Stop iterating and close the notification connection
    ///
    /// Idempotent. Returns once the background tasks have finished.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stop.trigger();
        self.subscriber.join().await;
        self.watcher.join().await;
        self.stopped = true;
        log::info!("Stopped iterating queue '{}'", self.queue);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stop_requested()
    }

    /// Convert into a `Stream`
    ///
    /// The stream yields non-terminal errors and keeps going; it ends after a
    /// terminal error or once the iterator is stopped.
    pub fn into_stream(self) -> impl Stream<Item = QueueResult<Delivery<T>>> + Send {
        stream::unfold((self, false), |(mut iter, finished)| async move {
            if finished {
                return None;
            }
            match iter.next().await {
                Ok(Some(delivery)) => Some((Ok(delivery), (iter, false))),
                Ok(None) => None,
                Err(e) => {
                    let terminal = e.is_terminal();
                    Some((Err(e), (iter, terminal)))
                }
            }
        })
    }
}

impl<T> Drop for QueueIterator<T> {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop.trigger();
        }
    }
}

/// Stops a [`QueueIterator`] from outside the task driving it
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<StopCoordinator>,
    gate: Arc<BlockGate>,
}

impl StopHandle {
    /// Request a stop; a pending `next()` returns `Ok(None)`
    pub fn stop(&self) {
        self.stop.trigger();
        for signal in [Signal::MessageReady, Signal::ConnectionReady] {
            if let Err(e) = self.gate.release(signal) {
                log::warn!("Failed to release {:?} while stopping: {}", signal, e);
            }
        }
    }
}
