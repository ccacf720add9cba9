use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{consumer_client_config, producer_client_config, to_consumed, topic_refs};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::connector::{
    ConsumerConnector, ConsumerSession, DeliveryFailure, DeliveryReport, DeliveryReports,
    ProducerConnection, ProducerConnector,
};
use crate::record::{ConsumedRecord, Record, RecordCoordinates};
use crate::{MessagingError, Result};

/// Future-driven Kafka adapter with explicit commits.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamKafka;

pub struct StreamConnection {
    producer: FutureProducer,
    reports: Mutex<Option<mpsc::UnboundedSender<DeliveryReport>>>,
}

impl StreamConnection {
    fn report(&self, report: DeliveryReport) {
        if let Some(tx) = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(report);
        }
    }

    fn is_closed(&self) -> bool {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[async_trait]
impl ProducerConnector for StreamKafka {
    type Connection = StreamConnection;

    fn name(&self) -> &'static str {
        "kafka-stream"
    }

    async fn connect(
        &self,
        config: &ProducerConfig,
    ) -> Result<(Self::Connection, DeliveryReports)> {
        let producer: FutureProducer = producer_client_config(config)
            .create()
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = StreamConnection {
            producer,
            reports: Mutex::new(Some(tx)),
        };
        Ok((connection, rx))
    }
}

#[async_trait]
impl ProducerConnection for StreamConnection {
    /// Waits for the broker's acknowledgement before returning.
    async fn send(&self, topic: &str, record: Record) -> Result<()> {
        if self.is_closed() {
            return Err(MessagingError::Send("producer closed".to_string()));
        }

        let key = record.key.to_string();
        let delivery = self
            .producer
            .send(
                FutureRecord::to(topic)
                    .key(key.as_str())
                    .payload(record.value.as_str()),
                Timeout::Never,
            )
            .await;

        match delivery {
            Ok((partition, offset)) => {
                self.report(Ok(RecordCoordinates::new(topic, partition, offset)));
                Ok(())
            }
            Err((err, _)) => {
                self.report(Err(DeliveryFailure {
                    topic: topic.to_string(),
                    reason: err.to_string(),
                }));
                Err(MessagingError::Send(err.to_string()))
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            let _ = producer.flush(Timeout::After(timeout));
            producer.in_flight_count().max(0) as usize
        })
        .await
        .unwrap_or(0)
    }

    async fn close(&self) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Consumer session that commits each record after it is processed.
pub struct StreamSession {
    consumer: StreamConsumer,
    closed: CancellationToken,
}

#[async_trait]
impl ConsumerConnector for StreamKafka {
    type Session = StreamSession;

    fn name(&self) -> &'static str {
        "kafka-stream"
    }

    async fn connect(&self, config: &ConsumerConfig) -> Result<Self::Session> {
        config.validate()?;

        let consumer: StreamConsumer = consumer_client_config(config, false)
            .create()
            .map_err(|e| MessagingError::Connection(e.to_string()))?;
        consumer
            .subscribe(&topic_refs(config))
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        Ok(StreamSession {
            consumer,
            closed: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl ConsumerSession for StreamSession {
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            received = tokio::time::timeout(timeout, self.consumer.recv()) => match received {
                Err(_) => Ok(None),
                Ok(Ok(message)) => Ok(Some(to_consumed(&message))),
                Ok(Err(err)) => Err(MessagingError::Poll(err.to_string())),
            },
        }
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<()> {
        let coordinates = &record.coordinates;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &coordinates.topic,
            coordinates.partition,
            Offset::Offset(coordinates.offset + 1),
        )
        .map_err(|e| MessagingError::Commit(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| MessagingError::Commit(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.consumer.unsubscribe();
    }
}
