//! Tests for notification-driven wake-ups

#[cfg(test)]
mod tests {
    use super::super::support::{memory_broker, wait_until, Job};
    use crate::broker::{BrokerClient, MemoryBroker};
    use crate::core::config::StreamSettings;
    use crate::queue::api::QueueDefinition;
    use std::sync::Arc;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_pending_next_resolves_on_send() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        let mut iter = queue.iter().await.unwrap();

        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;
        assert!(!pending.is_finished());

        queue.send(Job { v: 7 }).await.unwrap();

        let (mut iter, result) = timeout(Duration::from_secs(1), pending)
            .await
            .expect("notification wakes the loop")
            .unwrap();
        assert_eq!(result.unwrap().unwrap().data(), &Job { v: 7 });
        // One empty poll, then exactly one poll after the notification
        assert_eq!(broker.stats().receive_calls, 2);

        iter.stop().await;
    }

    #[tokio::test]
    async fn test_custom_notification_marker_still_wakes() {
        let settings = StreamSettings::from_toml_str(
            r#"
            [memory-broker]
            notification-marker = "notify:"
            "#,
        )
        .unwrap();
        let broker = MemoryBroker::from_settings(&settings.memory_broker);
        let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
        let queue = QueueDefinition::<Job>::new(client)
            .with_name("jobs")
            .with_settings(settings);
        assert_eq!(queue.notification_channel(), "rsmq:notify:jobs");

        let mut iter = queue.iter().await.unwrap();
        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;

        queue.send(Job { v: 1 }).await.unwrap();

        let (mut iter, result) = timeout(Duration::from_millis(500), pending)
            .await
            .expect("send on a custom marker wakes the loop")
            .unwrap();
        assert_eq!(result.unwrap().unwrap().data(), &Job { v: 1 });
        assert_eq!(broker.stats().receive_calls, 2);

        iter.stop().await;
    }

    #[tokio::test]
    async fn test_idle_loop_does_not_poll() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        let mut iter = queue.iter().await.unwrap();

        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;

        sleep(Duration::from_millis(50)).await;

        assert_eq!(broker.stats().receive_calls, 1);
        assert!(!pending.is_finished());
        pending.abort();
    }

    #[tokio::test]
    async fn test_notification_burst_coalesces_into_one_poll() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        let mut iter = queue.iter().await.unwrap();

        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;

        for _ in 0..5 {
            assert_eq!(broker.notify("jobs").unwrap(), 1);
        }
        sleep(Duration::from_millis(50)).await;

        assert_eq!(broker.stats().receive_calls, 2);
        assert!(!pending.is_finished());

        queue.send(Job { v: 1 }).await.unwrap();
        let (mut iter, result) = timeout(Duration::from_secs(1), pending)
            .await
            .expect("send wakes the loop")
            .unwrap();
        assert_eq!(result.unwrap().unwrap().data(), &Job { v: 1 });
        assert_eq!(broker.stats().receive_calls, 3);

        iter.stop().await;
    }

    #[tokio::test]
    async fn test_notification_without_message_keeps_waiting() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client).with_name("jobs");
        let mut iter = queue.iter().await.unwrap();

        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;

        broker.notify("jobs").unwrap();
        wait_until(|| broker.stats().empty_receives == 2).await;

        assert!(!pending.is_finished());
        pending.abort();
    }

    #[tokio::test]
    async fn test_notifications_for_other_queues_are_ignored() {
        let (broker, client) = memory_broker();
        let queue = QueueDefinition::<Job>::new(client.clone()).with_name("jobs");
        let other = QueueDefinition::<Job>::new(client).with_name("other");
        let mut iter = queue.iter().await.unwrap();

        let pending = tokio::spawn(async move {
            let result = iter.next().await;
            (iter, result)
        });
        wait_until(|| broker.stats().empty_receives == 1).await;

        other.send(Job { v: 1 }).await.unwrap();
        sleep(Duration::from_millis(30)).await;

        assert_eq!(broker.stats().receive_calls, 1);
        assert!(!pending.is_finished());
        pending.abort();
    }
}
