//! Common test utilities and helpers

use queuestream::broker::{BrokerClient, MemoryBroker};
use queuestream::queue::{Delivery, QueueError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resize {
    pub id: u32,
    pub width: u32,
}

pub fn shared_broker(broker: &MemoryBroker) -> Arc<dyn BrokerClient> {
    Arc::new(broker.clone())
}

/// Acknowledge, retrying while the broker is briefly unreachable
pub async fn acknowledge_with_retry<T>(delivery: &Delivery<T>) {
    for _ in 0..200 {
        match delivery.acknowledge().await {
            Ok(_) => return,
            Err(QueueError::Broker(_)) => sleep(Duration::from_millis(5)).await,
            Err(e) => panic!("Unexpected acknowledgement error: {}", e),
        }
    }
    panic!("Could not acknowledge {}", delivery.id());
}
