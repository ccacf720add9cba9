use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use tokio::sync::mpsc;

use super::{consumer_client_config, producer_client_config, to_consumed, topic_refs};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::connector::{
    ConsumerConnector, ConsumerSession, DeliveryFailure, DeliveryReport, DeliveryReports,
    ProducerConnection, ProducerConnector,
};
use crate::record::{ConsumedRecord, Record, RecordCoordinates};
use crate::{MessagingError, Result};

/// Pause before retrying a send the local queue pushed back on.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Forwards librdkafka delivery callbacks to the producer's listener task.
pub struct DeliveryForwarder {
    reports: mpsc::UnboundedSender<DeliveryReport>,
}

impl ClientContext for DeliveryForwarder {}

impl ProducerContext for DeliveryForwarder {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => Ok(RecordCoordinates::new(
                message.topic(),
                message.partition(),
                message.offset(),
            )),
            Err((err, message)) => Err(DeliveryFailure {
                topic: message.topic().to_string(),
                reason: err.to_string(),
            }),
        };
        let _ = self.reports.send(report);
    }
}

type Threaded = ThreadedProducer<DeliveryForwarder>;

/// Callback-driven Kafka adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadedKafka;

pub struct ThreadedConnection {
    producer: Mutex<Option<Arc<Threaded>>>,
}

impl ThreadedConnection {
    fn producer(&self) -> Result<Arc<Threaded>> {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MessagingError::Send("producer closed".to_string()))
    }
}

#[async_trait]
impl ProducerConnector for ThreadedKafka {
    type Connection = ThreadedConnection;

    fn name(&self) -> &'static str {
        "kafka-threaded"
    }

    async fn connect(
        &self,
        config: &ProducerConfig,
    ) -> Result<(Self::Connection, DeliveryReports)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer: Threaded = producer_client_config(config)
            .create_with_context(DeliveryForwarder { reports: tx })
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let connection = ThreadedConnection {
            producer: Mutex::new(Some(Arc::new(producer))),
        };
        Ok((connection, rx))
    }
}

#[async_trait]
impl ProducerConnection for ThreadedConnection {
    async fn send(&self, topic: &str, record: Record) -> Result<()> {
        let producer = self.producer()?;
        let key = record.key.to_string();

        loop {
            let base = BaseRecord::<str, str>::to(topic)
                .key(key.as_str())
                .payload(record.value.as_str());
            let outcome = producer.send(base).map_err(|(err, _)| err);
            match outcome {
                Ok(()) => return Ok(()),
                Err(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull)) => {
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err(err) => return Err(MessagingError::Send(err.to_string())),
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let Ok(producer) = self.producer() else {
            return 0;
        };
        tokio::task::spawn_blocking(move || {
            let _ = producer.flush(Timeout::After(timeout));
            producer.in_flight_count().max(0) as usize
        })
        .await
        .unwrap_or(0)
    }

    async fn close(&self) {
        let producer = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping joins the polling thread and releases the report channel.
        if let Some(producer) = producer {
            let _ = tokio::task::spawn_blocking(move || drop(producer)).await;
        }
    }
}

/// Consumer session polled on the blocking pool.
///
/// Offsets are stored after processing and committed by the auto-commit
/// timer. A poll abandoned at shutdown may still pull a record off the
/// blocking pool; its offset is never stored, so the group sees it again.
pub struct ThreadedSession {
    consumer: Arc<BaseConsumer>,
    closed: AtomicBool,
}

#[async_trait]
impl ConsumerConnector for ThreadedKafka {
    type Session = ThreadedSession;

    fn name(&self) -> &'static str {
        "kafka-threaded"
    }

    async fn connect(&self, config: &ConsumerConfig) -> Result<Self::Session> {
        config.validate()?;

        let consumer: BaseConsumer = consumer_client_config(config, true)
            .create()
            .map_err(|e| MessagingError::Connection(e.to_string()))?;
        consumer
            .subscribe(&topic_refs(config))
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        Ok(ThreadedSession {
            consumer: Arc::new(consumer),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ConsumerSession for ThreadedSession {
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }

        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || match consumer.poll(timeout) {
            None => Ok(None),
            Some(Ok(message)) => Ok(Some(to_consumed(&message))),
            Some(Err(err)) => Err(MessagingError::Poll(err.to_string())),
        })
        .await
        .map_err(|e| MessagingError::Poll(e.to_string()))?
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<()> {
        let coordinates = &record.coordinates;
        self.consumer
            .store_offset(&coordinates.topic, coordinates.partition, coordinates.offset)
            .map_err(|e| MessagingError::Commit(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let consumer = Arc::clone(&self.consumer);
        let _ = tokio::task::spawn_blocking(move || consumer.unsubscribe()).await;
    }
}
