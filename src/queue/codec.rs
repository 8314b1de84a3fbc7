//! Pluggable payload encoding
//!
//! A [`QueueCodec`] turns values into broker payloads and back. Queue
//! definitions default to [`JsonCodec`]; any other textual encoding can be
//! supplied per definition with `QueueDefinition::with_codec`.

use crate::queue::error::{QueueError, QueueResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialization strategy for a queue's messages
pub trait QueueCodec<T>: Send + Sync {
    /// Encode a value into a broker payload
    fn serialize(&self, queue: &str, data: &T) -> QueueResult<String>;

    /// Decode a broker payload into a value
    fn deserialize(&self, queue: &str, payload: &str) -> QueueResult<T>;
}

/// Encodes messages as JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> QueueCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, queue: &str, data: &T) -> QueueResult<String> {
        serde_json::to_string(data).map_err(|e| QueueError::Serialization {
            queue: queue.to_string(),
            message: format!("Failed to serialize {}: {}", std::any::type_name::<T>(), e),
        })
    }

    fn deserialize(&self, queue: &str, payload: &str) -> QueueResult<T> {
        serde_json::from_str(payload).map_err(|e| {
            let preview = payload_preview(payload);
            QueueError::Deserialization {
                queue: queue.to_string(),
                message: format!(
                    "Failed to deserialize message to {}: {} | data_length: {}, data_preview: '{}'",
                    std::any::type_name::<T>(),
                    e,
                    payload.len(),
                    preview
                ),
            }
        })
    }
}

/// First 100 bytes of a payload, cut on a character boundary
fn payload_preview(payload: &str) -> String {
    if payload.len() <= 100 {
        return payload.to_string();
    }
    let mut end = 100;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &payload[..end])
}
