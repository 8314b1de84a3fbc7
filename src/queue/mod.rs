//! Push-style queue iteration
//!
//! Turns a poll-based broker into an asynchronous sequence of messages that
//! survives broker disconnects.
//!
//! # Architecture
//!
//! ```text
//!   QueueDefinition ── send() ──────────────────────────▶ BrokerClient
//!         │                                                   ▲   │
//!         │ iter()                                   receive  │   │ lifecycle
//!         ▼                                                   │   ▼
//!   ┌───────────────┐  arm/await   ┌───────────┐  release ┌──────────────────┐
//!   │ QueueIterator │ ───────────▶ │ BlockGate │ ◀─────── │ ReconnectWatcher │
//!   │ (receive loop)│              └───────────┘          └──────────────────┘
//!   └───────────────┘                    ▲ release
//!                                  ┌─────┴──────────┐   notifications
//!                                  │ WakeSubscriber │ ◀──────────────── broker
//!                                  └────────────────┘
//! ```
//!
//! - [`BlockGate`]: single-slot, level-style wait primitive keyed by [`Signal`]
//! - [`WakeSubscriber`]: releases `MessageReady` on every realtime notification
//! - [`ReconnectWatcher`]: follows lifecycle events and releases `ConnectionReady`
//! - [`QueueIterator`]: the receive loop behind `next()`
//! - [`QueueDefinition`]: names the queue, picks the codec, exposes `send` and `iter`
//!
//! Delivery is at-least-once: a message that is never acknowledged is
//! delivered again after the broker's visibility timeout.

pub mod api;
mod codec;
mod definition;
mod error;
mod gate;
mod iterator;
mod message;
mod reconnect;
mod wake;

pub use codec::{JsonCodec, QueueCodec};
pub use definition::{BrokerQueueExt, QueueDefinition};
pub use error::{QueueError, QueueResult};
pub use gate::{BlockGate, GateWait, Signal};
pub use iterator::{QueueIterator, StopHandle};
pub use message::{Acknowledger, Delivery};
pub use reconnect::{
    backoff_window, ConnectionState, ConnectionStateMachine, ReconnectWatcher, WatcherAction,
};
pub use wake::WakeSubscriber;

#[cfg(test)]
mod tests;
