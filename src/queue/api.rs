//! Public API for queue iteration
//!
//! External modules should import from here rather than directly from the
//! implementation modules.

// Queue facade
pub use crate::queue::codec::{JsonCodec, QueueCodec};
pub use crate::queue::definition::{BrokerQueueExt, QueueDefinition};

// Iteration and deliveries
pub use crate::queue::iterator::{QueueIterator, StopHandle};
pub use crate::queue::message::{Acknowledger, Delivery};
pub use crate::queue::reconnect::ConnectionState;

// Error handling
pub use crate::queue::error::{QueueError, QueueResult};
