//! Producer lifecycle management.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ProducerConfig;
use crate::connector::{DeliveryReports, ProducerConnection, ProducerConnector};
use crate::observer::{LifecycleEvent, LifecycleObserver};
use crate::record::Record;
use crate::state::ProducerState;
use crate::{MessagingError, Result};

/// Sends between cooperative yields during a burst.
const YIELD_INTERVAL: usize = 1024;

/// Uniform producer contract.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Connects to the broker if not already connected.
    ///
    /// Concurrent callers observe exactly one connection attempt. Fails with
    /// [`MessagingError::Closed`] once the producer has been shut down.
    async fn initialize(&self) -> Result<()>;

    /// Emits one burst of records carrying `order_id`.
    ///
    /// Initializes first if needed. The first failed send aborts the rest of
    /// the burst and is returned.
    async fn publish_order(&self, order_id: &str) -> Result<()>;

    /// Drains and closes the connection, waiting no later than `deadline`.
    ///
    /// A no-op if the producer was never initialized. Afterwards the
    /// producer is closed for good.
    async fn shutdown(&self, deadline: Instant);

    /// Returns the current lifecycle state.
    async fn state(&self) -> ProducerState;
}

struct ProducerInner<T> {
    state: ProducerState,
    connection: Option<Arc<T>>,
    delivery_listener: Option<JoinHandle<()>>,
}

/// Producer lifecycle over any [`ProducerConnector`].
///
/// One manager owns at most one connection. Lifecycle transitions and the
/// connection handle sit behind a single async mutex, which is never held
/// while the connection drains.
pub struct ProducerManager<C: ProducerConnector> {
    connector: C,
    config: ProducerConfig,
    observer: Arc<dyn LifecycleObserver>,
    inner: Mutex<ProducerInner<C::Connection>>,
    // Set when shutdown gave up waiting for the lock.
    abandoned: AtomicBool,
}

impl<C: ProducerConnector> ProducerManager<C> {
    pub fn new(connector: C, config: ProducerConfig, observer: Arc<dyn LifecycleObserver>) -> Self {
        Self {
            connector,
            config,
            observer,
            inner: Mutex::new(ProducerInner {
                state: ProducerState::Uninitialized,
                connection: None,
                delivery_listener: None,
            }),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

#[async_trait]
impl<C: ProducerConnector> MessageProducer for ProducerManager<C> {
    async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            ProducerState::Initialized => return Ok(()),
            ProducerState::ShuttingDown | ProducerState::Closed => {
                return Err(MessagingError::Closed);
            }
            ProducerState::Uninitialized => {}
        }
        if self.abandoned.load(Ordering::Acquire) {
            inner.state = ProducerState::Closed;
            return Err(MessagingError::Closed);
        }

        let adapter = self.connector.name();
        let (connection, reports) = match self.connector.connect(&self.config).await {
            Ok(opened) => opened,
            Err(err) => {
                let err = match err {
                    MessagingError::Connection(_) => err,
                    other => MessagingError::Connection(other.to_string()),
                };
                self.observer.record(LifecycleEvent::ProducerConnectFailed {
                    adapter,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let listener = tokio::spawn(listen_for_deliveries(
            reports,
            Arc::clone(&self.observer),
        ));

        // A shutdown timed out while this connect was in flight.
        if self.abandoned.load(Ordering::Acquire) {
            inner.state = ProducerState::Closed;
            drop(inner);
            tokio::spawn(drain(
                Arc::new(connection),
                Some(listener),
                Arc::clone(&self.observer),
                adapter,
                self.config.flush_timeout,
            ));
            return Err(MessagingError::Closed);
        }

        inner.connection = Some(Arc::new(connection));
        inner.delivery_listener = Some(listener);
        inner.state = ProducerState::Initialized;

        self.observer.record(LifecycleEvent::ProducerInitialized {
            adapter,
            brokers: self.config.bootstrap_servers(),
        });

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(adapter = self.connector.name()))]
    async fn publish_order(&self, order_id: &str) -> Result<()> {
        self.initialize().await?;

        // Shutdown may have won the race since initialize released the lock.
        let connection = {
            let inner = self.inner.lock().await;
            inner.connection.clone().ok_or(MessagingError::Closed)?
        };

        let started = Instant::now();
        for sent in 0..self.config.burst_size {
            let record = Record::for_order(order_id);
            if let Err(err) = connection.send(&self.config.topic, record).await {
                self.observer.record(LifecycleEvent::PublishFailed {
                    order_id: order_id.to_string(),
                    sent,
                    error: err.to_string(),
                });
                return Err(MessagingError::Publish {
                    sent,
                    reason: err.to_string(),
                });
            }

            if (sent + 1) % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }

        self.observer.record(LifecycleEvent::BurstCompleted {
            order_id: order_id.to_string(),
            records: self.config.burst_size,
            elapsed: started.elapsed(),
        });

        Ok(())
    }

    async fn shutdown(&self, deadline: Instant) {
        let adapter = self.connector.name();

        let mut inner = match tokio::time::timeout_at(deadline, self.inner.lock()).await {
            Ok(inner) => inner,
            Err(_) => {
                self.abandoned.store(true, Ordering::Release);
                self.observer
                    .record(LifecycleEvent::ShutdownTimedOut { adapter });
                return;
            }
        };

        if inner.state != ProducerState::Initialized {
            return;
        }
        let Some(connection) = inner.connection.take() else {
            inner.state = ProducerState::Closed;
            return;
        };
        let listener = inner.delivery_listener.take();
        inner.state = ProducerState::ShuttingDown;
        drop(inner);

        let draining = tokio::spawn(drain(
            connection,
            listener,
            Arc::clone(&self.observer),
            adapter,
            self.config.flush_timeout,
        ));

        // On expiry the drain keeps running detached; the caller moves on.
        match tokio::time::timeout_at(deadline, draining).await {
            Ok(_) => self
                .observer
                .record(LifecycleEvent::ShutdownCompleted { adapter }),
            Err(_) => self
                .observer
                .record(LifecycleEvent::ShutdownTimedOut { adapter }),
        }

        self.inner.lock().await.state = ProducerState::Closed;
    }

    async fn state(&self) -> ProducerState {
        self.inner.lock().await.state
    }
}

/// Flushes and closes `connection`, then waits for its delivery listener.
async fn drain<T: ProducerConnection>(
    connection: Arc<T>,
    listener: Option<JoinHandle<()>>,
    observer: Arc<dyn LifecycleObserver>,
    adapter: &'static str,
    flush_timeout: std::time::Duration,
) {
    let unflushed = connection.flush(flush_timeout).await;
    if unflushed > 0 {
        observer.record(LifecycleEvent::RecordsUnflushed { count: unflushed });
    }
    connection.close().await;
    observer.record(LifecycleEvent::ProducerClosed { adapter });
    if let Some(listener) = listener {
        let _ = listener.await;
    }
}

async fn listen_for_deliveries(mut reports: DeliveryReports, observer: Arc<dyn LifecycleObserver>) {
    while let Some(report) = reports.recv().await {
        match report {
            Ok(coordinates) => observer.record(LifecycleEvent::RecordDelivered { coordinates }),
            Err(failure) => observer.record(LifecycleEvent::DeliveryFailed {
                topic: failure.topic,
                error: failure.reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::memory::InMemoryBroker;
    use crate::observer::RecordingObserver;

    fn manager(
        broker: &InMemoryBroker,
        burst_size: usize,
    ) -> (ProducerManager<InMemoryBroker>, RecordingObserver) {
        let observer = RecordingObserver::new();
        let config = ProducerConfig::default().with_burst_size(burst_size);
        let manager = ProducerManager::new(broker.clone(), config, Arc::new(observer.clone()));
        (manager, observer)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let broker = InMemoryBroker::new();
        let (producer, _) = manager(&broker, 1);

        producer.initialize().await.unwrap();
        producer.initialize().await.unwrap();

        assert_eq!(broker.producer_connections(), 1);
        assert_eq!(producer.state().await, ProducerState::Initialized);
    }

    #[tokio::test]
    async fn test_failed_initialize_stays_uninitialized() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);
        let (producer, observer) = manager(&broker, 1);

        let result = producer.initialize().await;

        assert!(matches!(result, Err(MessagingError::Connection(_))));
        assert_eq!(producer.state().await, ProducerState::Uninitialized);
        assert_eq!(
            observer.count(|e| matches!(e, LifecycleEvent::ProducerConnectFailed { .. })),
            1
        );

        broker.set_unavailable(false);
        producer.initialize().await.unwrap();
        assert_eq!(producer.state().await, ProducerState::Initialized);
    }

    #[tokio::test]
    async fn test_publish_initializes_and_emits_burst() {
        let broker = InMemoryBroker::new();
        let (producer, observer) = manager(&broker, 25);

        producer.publish_order("123").await.unwrap();

        let records = broker.records("orders");
        assert_eq!(records.len(), 25);
        assert!(records.iter().all(|r| r.value == "123"));
        assert_eq!(
            observer.count(|e| matches!(e, LifecycleEvent::BurstCompleted { records: 25, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_shutdown_when_uninitialized_is_noop() {
        let broker = InMemoryBroker::new();
        let (producer, observer) = manager(&broker, 1);

        producer.shutdown(Instant::now() + Duration::from_secs(1)).await;

        assert_eq!(producer.state().await, ProducerState::Uninitialized);
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_rejects_reuse() {
        let broker = InMemoryBroker::new();
        let (producer, observer) = manager(&broker, 3);
        producer.publish_order("1").await.unwrap();

        producer.shutdown(Instant::now() + Duration::from_secs(1)).await;

        assert_eq!(producer.state().await, ProducerState::Closed);
        assert_eq!(
            observer.count(|e| matches!(e, LifecycleEvent::ShutdownCompleted { .. })),
            1
        );
        assert!(matches!(
            producer.initialize().await,
            Err(MessagingError::Closed)
        ));
        assert!(matches!(
            producer.publish_order("2").await,
            Err(MessagingError::Closed)
        ));
        assert_eq!(broker.producer_connections(), 1);
    }

    /// Connector whose connect stalls before reaching the broker.
    struct StalledConnector {
        broker: InMemoryBroker,
        stall: Duration,
    }

    #[async_trait]
    impl ProducerConnector for StalledConnector {
        type Connection = <InMemoryBroker as ProducerConnector>::Connection;

        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn connect(
            &self,
            config: &ProducerConfig,
        ) -> Result<(Self::Connection, DeliveryReports)> {
            tokio::time::sleep(self.stall).await;
            ProducerConnector::connect(&self.broker, config).await
        }
    }

    #[tokio::test]
    async fn test_shutdown_deadline_bounds_wait_for_stalled_initialize() {
        let broker = InMemoryBroker::new();
        let observer = RecordingObserver::new();
        let producer = Arc::new(ProducerManager::new(
            StalledConnector {
                broker: broker.clone(),
                stall: Duration::from_millis(500),
            },
            ProducerConfig::default(),
            Arc::new(observer.clone()),
        ));

        let initializing = {
            let producer = Arc::clone(&producer);
            tokio::spawn(async move { producer.initialize().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        producer
            .shutdown(Instant::now() + Duration::from_millis(50))
            .await;
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(observer.shutdown_timed_out());

        let result = initializing.await.unwrap();
        assert!(matches!(result, Err(MessagingError::Closed)));
        assert_eq!(producer.state().await, ProducerState::Closed);
        assert!(matches!(
            producer.initialize().await,
            Err(MessagingError::Closed)
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while observer.count(|e| matches!(e, LifecycleEvent::ProducerClosed { .. })) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("late connection was not closed");
        assert_eq!(broker.producer_connections(), 1);
    }

    #[tokio::test]
    async fn test_state_is_readable_while_draining() {
        let broker = InMemoryBroker::new();
        broker.set_close_delay(Duration::from_secs(5));
        let (producer, _) = manager(&broker, 2);
        let producer = Arc::new(producer);
        producer.publish_order("9").await.unwrap();

        let shutting_down = {
            let producer = Arc::clone(&producer);
            tokio::spawn(async move {
                producer
                    .shutdown(Instant::now() + Duration::from_millis(300))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = tokio::time::timeout(Duration::from_millis(100), producer.state())
            .await
            .expect("state() blocked behind the drain");
        assert_eq!(state, ProducerState::ShuttingDown);

        shutting_down.await.unwrap();
        assert_eq!(producer.state().await, ProducerState::Closed);
    }

    #[tokio::test]
    async fn test_delivery_reports_reach_observer() {
        let broker = InMemoryBroker::new();
        let (producer, observer) = manager(&broker, 4);

        producer.publish_order("7").await.unwrap();
        producer.shutdown(Instant::now() + Duration::from_secs(1)).await;

        assert_eq!(
            observer.count(|e| matches!(e, LifecycleEvent::RecordDelivered { .. })),
            4
        );
    }
}
