//! Broker Error Types

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker is not connected")]
    NotConnected,

    #[error("Queue not found: {queue}")]
    QueueNotFound { queue: String },

    #[error("Invalid queue name '{queue}': {reason}")]
    InvalidQueueName { queue: String, reason: String },

    #[error("Message too large for queue {queue} ({size} bytes, max: {max_size})")]
    MessageTooLarge {
        queue: String,
        size: usize,
        max_size: usize,
    },

    #[error("Broker command failed: {message}")]
    Command { message: String },
}

/// Result type for broker commands
pub type BrokerResult<T> = Result<T, BrokerError>;

impl crate::core::error_handling::ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidQueueName { .. } | BrokerError::MessageTooLarge { .. }
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            BrokerError::InvalidQueueName { reason, .. } => Some(reason),
            BrokerError::MessageTooLarge { .. } => {
                Some("Message payload exceeds the queue's maximum size")
            }
            _ => None,
        }
    }
}
