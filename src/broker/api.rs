//! Public API for the broker contract
//!
//! External modules should import from here rather than directly from the
//! implementation modules.

pub use crate::broker::error::{BrokerError, BrokerResult};
pub use crate::broker::events::{
    notification_channel, notification_channel_with_marker, ConnectionEvent, RawMessage,
    DEFAULT_NOTIFICATION_MARKER,
};
pub use crate::broker::memory::{BrokerStats, MemoryBroker};
pub use crate::broker::traits::{BrokerClient, NotificationConnection};
