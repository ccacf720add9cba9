//! Producer and consumer lifecycle tests against the in-memory broker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use messaging::{
    CancellationToken, ConsumerConfig, ConsumerManager, ConsumerState, InMemoryBroker,
    LifecycleEvent, MessageConsumer, MessageProducer, MessagingError, ProducerConfig,
    ProducerManager, ProducerState, Record, RecordingObserver,
};
use orders::{InMemoryOrderRepository, OrderCreator, OrderError, OrderId, OrderService};
use tokio::time::Instant;

/// Gateway that remembers every call and can fail selected ones.
#[derive(Default)]
struct RecordingGateway {
    calls: Mutex<Vec<(String, i32)>>,
    next_id: AtomicUsize,
    fail_calls: Vec<usize>,
}

impl RecordingGateway {
    fn failing_on(fail_calls: Vec<usize>) -> Self {
        Self {
            fail_calls,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, i32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderCreator for RecordingGateway {
    async fn create_order(&self, description: &str, quantity: i32) -> orders::Result<OrderId> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((description.to_string(), quantity));
            calls.len()
        };
        if self.fail_calls.contains(&call) {
            return Err(OrderError::Unavailable("injected failure".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderId::new(id as i64))
    }
}

fn producer(
    broker: &InMemoryBroker,
    burst_size: usize,
) -> (Arc<ProducerManager<InMemoryBroker>>, RecordingObserver) {
    let observer = RecordingObserver::new();
    let config = ProducerConfig::default().with_burst_size(burst_size);
    let manager = ProducerManager::new(broker.clone(), config, Arc::new(observer.clone()));
    (Arc::new(manager), observer)
}

fn consumer(
    broker: &InMemoryBroker,
    gateway: Arc<dyn OrderCreator>,
) -> (ConsumerManager<InMemoryBroker>, RecordingObserver) {
    let observer = RecordingObserver::new();
    let config = ConsumerConfig::default().with_poll_timeout(Duration::from_millis(10));
    let manager = ConsumerManager::new(broker.clone(), config, gateway, Arc::new(observer.clone()));
    (manager, observer)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_opens_one_connection() {
    let broker = InMemoryBroker::new();
    let (producer, _) = producer(&broker, 1);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let producer = Arc::clone(&producer);
            tokio::spawn(async move { producer.initialize().await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(broker.producer_connections(), 1);
    assert_eq!(producer.state().await, ProducerState::Initialized);
}

#[tokio::test]
async fn test_zero_deadline_shutdown_returns_promptly() {
    let broker = InMemoryBroker::new();
    broker.set_close_delay(Duration::from_secs(30));
    let (producer, observer) = producer(&broker, 1);
    producer.initialize().await.unwrap();

    let started = std::time::Instant::now();
    producer.shutdown(Instant::now()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(observer.shutdown_timed_out());
    assert_eq!(producer.state().await, ProducerState::Closed);
}

#[tokio::test]
async fn test_publish_after_shutdown_is_rejected() {
    let broker = InMemoryBroker::new();
    let (producer, _) = producer(&broker, 10);
    producer.publish_order("1").await.unwrap();

    producer
        .shutdown(Instant::now() + Duration::from_secs(1))
        .await;

    assert!(matches!(
        producer.publish_order("2").await,
        Err(MessagingError::Closed)
    ));
    assert_eq!(broker.topic_len("orders"), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_during_publish_closes_within_deadline() {
    let broker = InMemoryBroker::new();
    let (producer, observer) = producer(&broker, 200_000);

    let publishing = {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move { producer.publish_order("race").await })
    };
    wait_for(|| broker.topic_len("orders") > 0).await;

    let deadline = Instant::now() + Duration::from_secs(2);
    producer.shutdown(deadline).await;
    assert!(Instant::now() <= deadline + Duration::from_millis(100));

    let published = publishing.await.unwrap();
    assert!(matches!(
        published,
        Ok(()) | Err(MessagingError::Publish { .. })
    ));
    assert_eq!(producer.state().await, ProducerState::Closed);

    // Completion is only recorded once the delivery listener has been joined.
    assert!(!observer.shutdown_timed_out());
    assert_eq!(
        observer.count(|e| matches!(e, LifecycleEvent::ShutdownCompleted { .. })),
        1
    );
    assert_eq!(
        observer.count(|e| matches!(e, LifecycleEvent::RecordDelivered { .. })),
        broker.topic_len("orders")
    );
}

#[tokio::test]
async fn test_failed_burst_leaves_producer_usable() {
    let broker = InMemoryBroker::new();
    broker.fail_send_after(4);
    let (producer, observer) = producer(&broker, 10);

    let first = producer.publish_order("X").await;
    assert!(matches!(first, Err(MessagingError::Publish { sent: 4, .. })));
    assert_eq!(broker.topic_len("orders"), 4);

    producer.publish_order("X").await.unwrap();
    assert_eq!(broker.topic_len("orders"), 14);
    assert_eq!(producer.state().await, ProducerState::Initialized);
    assert_eq!(broker.producer_connections(), 1);
    assert_eq!(
        observer.count(|e| matches!(e, LifecycleEvent::PublishFailed { sent: 4, .. })),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_stops_every_worker() {
    let broker = InMemoryBroker::new();
    let gateway: Arc<dyn OrderCreator> = Arc::new(RecordingGateway::default());
    let (consumer, observer) = consumer(&broker, gateway);

    let cancel = CancellationToken::new();
    for _ in 0..6 {
        consumer.start(cancel.clone());
    }
    wait_for(|| observer.count(|e| matches!(e, LifecycleEvent::WorkerStarted { .. })) == 6).await;

    let started = std::time::Instant::now();
    cancel.cancel();
    consumer.wait().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(
        observer.count(|e| matches!(e, LifecycleEvent::WorkerStopped { .. })),
        6
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_record_gets_one_creation_attempt() {
    let broker = InMemoryBroker::new();
    let gateway = Arc::new(RecordingGateway::default());
    let (consumer, observer) = consumer(&broker, gateway.clone());

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        consumer.start(cancel.clone());
    }
    for i in 0..50 {
        broker.append("orders", Record::for_order(&i.to_string()));
    }

    wait_for(|| observer.processed().len() == 50).await;
    cancel.cancel();
    consumer.wait().await;

    assert_eq!(gateway.calls().len(), 50);
    assert_eq!(broker.committed_offset("order-consumers", "orders"), Some(50));
}

#[tokio::test]
async fn test_creation_failure_does_not_stop_the_loop() {
    let broker = InMemoryBroker::new();
    let gateway = Arc::new(RecordingGateway::failing_on(vec![1]));
    let (consumer, observer) = consumer(&broker, gateway.clone());
    broker.append("orders", Record::for_order("R"));
    broker.append("orders", Record::for_order("R+1"));

    let cancel = CancellationToken::new();
    consumer.start(cancel.clone());
    wait_for(|| observer.processed().len() == 2).await;
    cancel.cancel();
    consumer.wait().await;

    let outcomes: Vec<bool> = observer
        .processed()
        .iter()
        .map(|e| matches!(e, LifecycleEvent::RecordProcessed { error: None, .. }))
        .collect();
    assert_eq!(outcomes, vec![false, true]);
    assert_eq!(gateway.calls().len(), 2);
    // A failed creation still counts as consumed.
    assert_eq!(broker.committed_offset("order-consumers", "orders"), Some(2));
}

#[tokio::test]
async fn test_single_record_creates_one_order() {
    let broker = InMemoryBroker::new();
    let repo = InMemoryOrderRepository::new();
    let service = Arc::new(OrderService::new(repo.clone()));
    let (consumer, observer) = consumer(&broker, service);
    broker.append("orders", Record::for_order("42"));

    let cancel = CancellationToken::new();
    consumer.start(cancel.clone());
    wait_for(|| observer.processed().len() == 1).await;
    cancel.cancel();
    consumer.wait().await;

    let orders = repo.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 1);
    let token = orders[0].description.strip_prefix("Note-").unwrap();
    assert!(!token.is_empty());

    match &observer.processed()[0] {
        LifecycleEvent::RecordProcessed {
            order_id,
            message_id,
            coordinates,
            ..
        } => {
            assert!(order_id.unwrap().as_i64() > 0);
            assert_eq!(token, message_id.to_string());
            assert_eq!(coordinates.offset, 0);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_descriptions_use_a_fresh_token_per_record() {
    let broker = InMemoryBroker::new();
    let gateway = Arc::new(RecordingGateway::default());
    let (consumer, observer) = consumer(&broker, gateway.clone());
    for _ in 0..3 {
        broker.append("orders", Record::for_order("42"));
    }

    let cancel = CancellationToken::new();
    consumer.start(cancel.clone());
    wait_for(|| observer.processed().len() == 3).await;
    cancel.cancel();
    consumer.wait().await;

    let mut descriptions: Vec<String> = gateway.calls().into_iter().map(|(d, _)| d).collect();
    descriptions.sort();
    descriptions.dedup();
    assert_eq!(descriptions.len(), 3);
    assert!(gateway.calls().iter().all(|(_, quantity)| *quantity == 1));
}

#[tokio::test]
async fn test_restarted_group_resumes_from_committed_offset() {
    let broker = InMemoryBroker::new();
    let gateway = Arc::new(RecordingGateway::default());
    for i in 0..3 {
        broker.append("orders", Record::for_order(&i.to_string()));
    }

    let (first, observer) = consumer(&broker, gateway.clone());
    let cancel = CancellationToken::new();
    first.start(cancel.clone());
    wait_for(|| observer.processed().len() == 3).await;
    cancel.cancel();
    first.wait().await;

    broker.append("orders", Record::for_order("3"));

    let (second, observer) = consumer(&broker, gateway.clone());
    let cancel = CancellationToken::new();
    second.start(cancel.clone());
    wait_for(|| observer.processed().len() == 1).await;
    cancel.cancel();
    second.wait().await;

    assert_eq!(gateway.calls().len(), 4);
    assert_eq!(broker.committed_offset("order-consumers", "orders"), Some(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_published_burst_flows_through_consumers() {
    let broker = InMemoryBroker::new();
    let repo = InMemoryOrderRepository::new();
    let (producer, producer_events) = producer(&broker, 200);
    let (consumer, consumer_events) = consumer(&broker, Arc::new(OrderService::new(repo.clone())));

    let cancel = CancellationToken::new();
    for _ in 0..2 {
        consumer.start(cancel.clone());
    }
    producer.publish_order("123").await.unwrap();

    wait_for(|| consumer_events.processed().len() == 200).await;
    cancel.cancel();
    producer
        .shutdown(Instant::now() + Duration::from_secs(1))
        .await;
    consumer.wait().await;

    assert_eq!(repo.order_count().await, 200);
    assert!(!producer_events.shutdown_timed_out());
    assert_eq!(
        producer_events.count(|e| matches!(e, LifecycleEvent::RecordDelivered { .. })),
        200
    );
}
