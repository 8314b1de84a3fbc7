//! Push-style asynchronous iteration over a poll-based message queue.
//!
//! See [`queue`] for the consumption loop and [`broker`] for the collaborator
//! contract it runs against.

pub mod broker;
pub mod core;
pub mod queue;
