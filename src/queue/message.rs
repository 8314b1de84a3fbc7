//! Delivered messages and their acknowledgement handles
//!
//! Every successful `next()` and every `send()` produces a [`Delivery`]: the
//! decoded value, the raw broker message, and an [`Acknowledger`] that
//! deletes the message from the broker. Delivery is at-least-once, so a
//! message that is never acknowledged will be handed out again once the
//! broker's visibility timeout expires.

use crate::broker::{BrokerClient, RawMessage};
use crate::queue::error::QueueResult;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const ACK_PENDING: u8 = 0;
const ACK_IN_FLIGHT: u8 = 1;
const ACK_DONE: u8 = 2;

/// Deletes one delivery from the broker
///
/// Clones share state, so acknowledging through any clone marks them all.
#[derive(Clone)]
pub struct Acknowledger {
    broker: Arc<dyn BrokerClient>,
    queue: String,
    id: String,
    state: Arc<AtomicU8>,
}

impl Acknowledger {
    pub(crate) fn new(broker: Arc<dyn BrokerClient>, queue: String, id: String) -> Self {
        Self {
            broker,
            queue,
            id,
            state: Arc::new(AtomicU8::new(ACK_PENDING)),
        }
    }

    /// Delete the message from the broker
    ///
    /// At most one call across all clones issues the delete at a time. Calls
    /// made while that delete is in flight, or after it succeeded, return
    /// `Ok(false)` without reaching the broker. A failed delete returns the
    /// handle to unacknowledged so it can be retried, as does dropping the
    /// returned future before the delete completes.
    pub async fn acknowledge(&self) -> QueueResult<bool> {
        let Some(claim) = InFlightClaim::acquire(&self.state) else {
            return Ok(false);
        };

        let deleted = self.broker.delete(&self.queue, &self.id).await?;
        claim.complete();
        if !deleted {
            log::debug!(
                "Acknowledged {} on queue '{}' but the broker no longer held it",
                self.id,
                self.queue
            );
        }
        Ok(deleted)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACK_DONE
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Exclusive right to issue the delete; rolls back to pending unless completed
struct InFlightClaim<'a> {
    state: &'a AtomicU8,
    completed: bool,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(ACK_PENDING, ACK_IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                state,
                completed: false,
            })
    }

    fn complete(mut self) {
        self.state.store(ACK_DONE, Ordering::Release);
        self.completed = true;
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state.store(ACK_PENDING, Ordering::Release);
        }
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger")
            .field("queue", &self.queue)
            .field("id", &self.id)
            .field("acknowledged", &self.is_acknowledged())
            .finish()
    }
}

/// A decoded message plus the means to acknowledge it
pub struct Delivery<T> {
    data: T,
    info: RawMessage,
    acknowledger: Acknowledger,
}

impl<T> Delivery<T> {
    pub(crate) fn new(data: T, info: RawMessage, acknowledger: Acknowledger) -> Self {
        Self {
            data,
            info,
            acknowledger,
        }
    }

    /// The decoded message value
    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// The raw `{id, payload}` as exchanged with the broker
    pub fn info(&self) -> &RawMessage {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Delete this message from the broker, marking it consumed
    pub async fn acknowledge(&self) -> QueueResult<bool> {
        self.acknowledger.acknowledge().await
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledger.is_acknowledged()
    }

    /// A detached handle for acknowledging after `data` has been moved out
    pub fn acknowledger(&self) -> Acknowledger {
        self.acknowledger.clone()
    }

    /// Split into the value and its acknowledgement handle
    pub fn into_parts(self) -> (T, Acknowledger) {
        (self.data, self.acknowledger)
    }
}

impl<T: fmt::Debug> fmt::Debug for Delivery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("data", &self.data)
            .field("info", &self.info)
            .field("acknowledged", &self.is_acknowledged())
            .finish()
    }
}
