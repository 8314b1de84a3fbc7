//! Shared fixtures for queue tests

use crate::broker::{BrokerClient, MemoryBroker};
use crate::core::config::{MemoryBrokerSettings, StreamSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub v: u32,
}

/// A broker handle for driving the test plus the same broker as a client
pub fn memory_broker() -> (MemoryBroker, Arc<dyn BrokerClient>) {
    let broker = MemoryBroker::new();
    let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
    (broker, client)
}

/// Like [`memory_broker`] with a short visibility timeout
pub fn memory_broker_with_visibility(timeout_ms: u64) -> (MemoryBroker, Arc<dyn BrokerClient>) {
    let broker = MemoryBroker::from_settings(&MemoryBrokerSettings {
        visibility_timeout_ms: timeout_ms,
        ..MemoryBrokerSettings::default()
    });
    let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
    (broker, client)
}

/// Settings with a small reconnect margin so backoff tests stay fast
pub fn fast_settings() -> StreamSettings {
    StreamSettings {
        reconnect_margin_ms: 5,
        ..StreamSettings::default()
    }
}

/// Poll `condition` until it holds, failing the test after one second
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "Condition not reached within one second"
        );
        sleep(Duration::from_millis(5)).await;
    }
}
