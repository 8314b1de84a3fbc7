//! Event and message types exchanged with the broker

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Marker inserted between the namespace and queue name for realtime channels
pub const DEFAULT_NOTIFICATION_MARKER: &str = "rt:";

/// Connection lifecycle events emitted by a broker client
///
/// Events are broadcast to every component holding a lifecycle receiver.
/// A closed lifecycle channel is treated the same as a permanent `End`.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    /// The main connection is (re)established and commands will succeed
    Connect,
    /// The broker is about to retry; it will wait `delay` and scales later
    /// attempts by `backoff`
    Reconnecting { delay: Duration, backoff: f64 },
    /// The main connection closed. `permanent` is set when the broker will
    /// not attempt to reconnect.
    End { permanent: bool },
}

impl ConnectionEvent {
    pub fn is_permanent_end(&self) -> bool {
        matches!(self, ConnectionEvent::End { permanent: true })
    }
}

/// A delivery as returned by the broker's `receive` command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Opaque identifier used for acknowledgement
    pub id: String,
    /// Serialized message body
    pub payload: String,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

/// Build the realtime notification channel name for a queue
///
/// # Examples
/// ```
/// use queuestream::broker::notification_channel;
///
/// assert_eq!(notification_channel("rsmq:", "jobs"), "rsmq:rt:jobs");
/// ```
pub fn notification_channel(namespace: &str, queue: &str) -> String {
    format!("{namespace}{DEFAULT_NOTIFICATION_MARKER}{queue}")
}

/// Build a notification channel name with a custom marker
pub fn notification_channel_with_marker(namespace: &str, marker: &str, queue: &str) -> String {
    format!("{namespace}{marker}{queue}")
}
