//! Queue Error Types

use crate::broker::BrokerError;
use crate::core::error_handling::ContextualError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Broker command failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Failed to serialize message for queue {queue}: {message}")]
    Serialization { queue: String, message: String },

    #[error("Failed to deserialize message from queue {queue}: {message}")]
    Deserialization { queue: String, message: String },

    #[error("Broker connection closed permanently while consuming queue {queue}")]
    ConnectionClosed { queue: String },

    #[error("Synchronisation error: {message}")]
    Synchronisation { message: String },
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

impl QueueError {
    /// True for errors after which the iterator will never yield again
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueError::ConnectionClosed { .. })
    }
}

impl ContextualError for QueueError {
    fn is_user_actionable(&self) -> bool {
        match self {
            QueueError::Broker(inner) => inner.is_user_actionable(),
            QueueError::Serialization { .. } | QueueError::Deserialization { .. } => true,
            _ => false,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            QueueError::Broker(inner) => inner.user_message(),
            QueueError::Serialization { message, .. }
            | QueueError::Deserialization { message, .. } => Some(message),
            _ => None,
        }
    }
}
