//! Tests for simulated connection loss and shutdown

#[cfg(test)]
mod tests {
    use crate::broker::{notification_channel, BrokerClient, BrokerError, ConnectionEvent, MemoryBroker};
    use tokio::time::Duration;

    #[tokio::test]
    async fn test_disconnect_emits_end_then_reconnecting() {
        let broker = MemoryBroker::new();
        let mut lifecycle = broker.lifecycle();

        broker.disconnect(Duration::from_millis(50), 1.5);

        assert!(!broker.is_connected());
        assert_eq!(
            lifecycle.recv().await.unwrap(),
            ConnectionEvent::End { permanent: false }
        );
        assert_eq!(
            lifecycle.recv().await.unwrap(),
            ConnectionEvent::Reconnecting {
                delay: Duration::from_millis(50),
                backoff: 1.5,
            }
        );

        broker.reconnect_attempt(Duration::from_millis(75), 1.5);
        broker.reconnect();

        assert!(matches!(
            lifecycle.recv().await.unwrap(),
            ConnectionEvent::Reconnecting { .. }
        ));
        assert_eq!(lifecycle.recv().await.unwrap(), ConnectionEvent::Connect);
        assert!(broker.is_connected());
    }

    #[tokio::test]
    async fn test_commands_fail_while_disconnected() {
        let broker = MemoryBroker::new();
        let id = broker.send("jobs", "kept").await.unwrap();

        broker.disconnect(Duration::from_millis(10), 1.0);

        assert_eq!(broker.send("jobs", "x").await, Err(BrokerError::NotConnected));
        assert_eq!(broker.receive("jobs").await, Err(BrokerError::NotConnected));
        assert_eq!(broker.delete("jobs", &id).await, Err(BrokerError::NotConnected));
        assert!(broker.subscribe("rsmq:rt:jobs").await.is_err());

        broker.reconnect();

        // Stored messages survive the outage
        let message = broker.receive("jobs").await.unwrap().unwrap();
        assert_eq!(message.id, id);
    }

    #[tokio::test]
    async fn test_disconnect_drops_notification_connections() {
        let broker = MemoryBroker::new();
        let mut connection = broker
            .subscribe(&notification_channel(broker.namespace(), "jobs"))
            .await
            .unwrap();

        broker.disconnect(Duration::from_millis(10), 1.0);

        assert_eq!(broker.stats().notification_connections, 0);
        assert_eq!(connection.next_notification().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_is_permanent_end() {
        let broker = MemoryBroker::new();
        let mut lifecycle = broker.lifecycle();

        broker.shutdown();

        let event = lifecycle.recv().await.unwrap();
        assert!(event.is_permanent_end());
        assert!(!broker.is_connected());
    }
}
