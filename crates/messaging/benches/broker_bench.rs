use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{
    CancellationToken, ConsumerConfig, ConsumerManager, InMemoryBroker, LifecycleObserver,
    MessageConsumer, MessageProducer, ProducerConfig, ProducerManager, Record, RecordingObserver,
};
use orders::{InMemoryOrderRepository, OrderService};

fn observer() -> Arc<dyn LifecycleObserver> {
    Arc::new(RecordingObserver::new())
}

fn bench_publish_burst_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("messaging/publish_burst_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = InMemoryBroker::new();
                let config = ProducerConfig::default().with_burst_size(1000);
                let producer = ProducerManager::new(broker, config, observer());
                producer.publish_order("123").await.unwrap();
            });
        });
    });
}

fn bench_initialize_and_shutdown(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("messaging/initialize_and_shutdown", |b| {
        b.iter(|| {
            rt.block_on(async {
                let producer = ProducerManager::new(
                    InMemoryBroker::new(),
                    ProducerConfig::default(),
                    observer(),
                );
                producer.initialize().await.unwrap();
                producer
                    .shutdown(tokio::time::Instant::now() + Duration::from_secs(1))
                    .await;
            });
        });
    });
}

fn bench_consume_100_records(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("messaging/consume_100_records", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = InMemoryBroker::new();
                for i in 0..100 {
                    broker.append("orders", Record::for_order(&i.to_string()));
                }
                let repo = InMemoryOrderRepository::new();
                let config =
                    ConsumerConfig::default().with_poll_timeout(Duration::from_millis(5));
                let consumer = ConsumerManager::new(
                    broker.clone(),
                    config,
                    Arc::new(OrderService::new(repo.clone())),
                    observer(),
                );

                let cancel = CancellationToken::new();
                consumer.start(cancel.clone());
                while broker.committed_offset("order-consumers", "orders") != Some(100) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                cancel.cancel();
                consumer.wait().await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_publish_burst_1000,
    bench_initialize_and_shutdown,
    bench_consume_100_records,
);
criterion_main!(benches);
