//! Broker Collaborator Contract
//!
//! The broker is the external message-queue service this crate consumes from.
//! It is modelled here as a narrow command interface plus a stream of
//! connection lifecycle events, so the consumption loop in [`crate::queue`]
//! never depends on a particular transport.
//!
//! # Overview
//!
//! - **Commands**: `send`, `receive` (non-blocking poll) and `delete`
//! - **Lifecycle**: `Connect`, `Reconnecting { delay, backoff }` and `End`
//!   events broadcast to every interested component
//! - **Realtime notifications**: a dedicated publish/subscribe connection per
//!   queue, named `"<namespace>rt:<queue>"`, whose payloads are pure wake signals
//!
//! ```text
//! ┌──────────────┐  send/receive/delete   ┌──────────────────┐
//! │ QueueIterator│ ─────────────────────▶ │   BrokerClient   │
//! │              │ ◀── lifecycle events ─ │ (shared, external)│
//! └──────┬───────┘                        └────────┬─────────┘
//!        │ owns                                    │ subscribe()
//!        ▼                                         ▼
//! ┌──────────────┐   notifications       ┌──────────────────────┐
//! │WakeSubscriber│ ◀──────────────────── │NotificationConnection│
//! └──────────────┘                       └──────────────────────┘
//! ```
//!
//! [`MemoryBroker`] is a complete in-process implementation with visibility
//! timeouts and realtime notifications, used by the test suites and usable as
//! a reference when wiring a real transport.

pub mod api;
mod error;
pub(crate) mod events;
mod memory;
mod traits;

pub use error::{BrokerError, BrokerResult};
pub use events::{notification_channel, notification_channel_with_marker, ConnectionEvent, RawMessage};
pub use memory::{BrokerStats, MemoryBroker};
pub use traits::{BrokerClient, NotificationConnection};

#[cfg(test)]
mod tests;
