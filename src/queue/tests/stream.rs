//! Tests for the `Stream` adapter

#[cfg(test)]
mod tests {
    use super::super::support::{memory_broker, Job};
    use crate::broker::BrokerClient;
    use crate::queue::api::{QueueDefinition, QueueError};
    use futures::StreamExt;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_stream_yields_messages_in_order() {
        let (_broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        for v in 1..=3 {
            queue.send(Job { v }).await.unwrap();
        }

        let stream = queue.iter().await.unwrap().into_stream();
        let values: Vec<u32> = stream
            .take(3)
            .map(|delivery| delivery.unwrap().into_data().v)
            .collect()
            .await;

        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_shutdown() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        queue.send(Job { v: 1 }).await.unwrap();

        let mut stream = Box::pin(queue.iter().await.unwrap().into_stream());
        let first = stream.next().await.unwrap().unwrap();
        first.acknowledge().await.unwrap();

        broker.shutdown();
        sleep(Duration::from_millis(20)).await;

        let error = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("shutdown reaches the stream")
            .unwrap()
            .unwrap_err();
        assert!(matches!(error, QueueError::ConnectionClosed { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_continues_past_decode_errors() {
        let (_broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client.clone()).with_name("jobs");
        client.send("jobs", "{\"v\": \"nope\"}").await.unwrap();
        queue.send(Job { v: 4 }).await.unwrap();

        let mut stream = Box::pin(queue.iter().await.unwrap().into_stream());

        assert!(matches!(
            stream.next().await,
            Some(Err(QueueError::Deserialization { .. }))
        ));
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.data(), &Job { v: 4 });
    }
}
