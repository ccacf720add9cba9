//! Adapter selection.

use std::sync::Arc;

use orders::OrderCreator;

#[cfg(feature = "kafka")]
use crate::adapters::kafka::{StreamKafka, ThreadedKafka};
use crate::adapters::memory::InMemoryBroker;
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::consumer::{ConsumerManager, MessageConsumer};
use crate::observer::LifecycleObserver;
use crate::producer::{MessageProducer, ProducerManager};
use crate::{MessagingError, Result};

/// Names of the interchangeable broker adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BrokerKind {
    #[default]
    Memory,
    KafkaThreaded,
    KafkaStream,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Memory => "memory",
            BrokerKind::KafkaThreaded => "kafka-threaded",
            BrokerKind::KafkaStream => "kafka-stream",
        }
    }
}

impl std::fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BrokerKind {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BrokerKind::Memory),
            "kafka-threaded" => Ok(BrokerKind::KafkaThreaded),
            "kafka-stream" => Ok(BrokerKind::KafkaStream),
            other => Err(MessagingError::InvalidConfig(format!(
                "unknown broker adapter '{other}' (expected memory, kafka-threaded or kafka-stream)"
            ))),
        }
    }
}

/// The active adapter, chosen once at startup.
///
/// Producers and consumers built from one backend talk to the same broker.
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(InMemoryBroker),
    #[cfg(feature = "kafka")]
    KafkaThreaded,
    #[cfg(feature = "kafka")]
    KafkaStream,
}

impl Backend {
    /// Builds the backend for `kind`.
    ///
    /// Kafka kinds fail with [`MessagingError::InvalidConfig`] unless the
    /// `kafka` feature is enabled.
    pub fn from_kind(kind: BrokerKind) -> Result<Self> {
        match kind {
            BrokerKind::Memory => Ok(Backend::Memory(InMemoryBroker::new())),
            #[cfg(feature = "kafka")]
            BrokerKind::KafkaThreaded => Ok(Backend::KafkaThreaded),
            #[cfg(feature = "kafka")]
            BrokerKind::KafkaStream => Ok(Backend::KafkaStream),
            #[cfg(not(feature = "kafka"))]
            other => Err(MessagingError::InvalidConfig(format!(
                "broker adapter '{other}' requires the `kafka` feature"
            ))),
        }
    }

    pub fn kind(&self) -> BrokerKind {
        match self {
            Backend::Memory(_) => BrokerKind::Memory,
            #[cfg(feature = "kafka")]
            Backend::KafkaThreaded => BrokerKind::KafkaThreaded,
            #[cfg(feature = "kafka")]
            Backend::KafkaStream => BrokerKind::KafkaStream,
        }
    }

    pub fn producer(
        &self,
        config: ProducerConfig,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Arc<dyn MessageProducer> {
        match self {
            Backend::Memory(broker) => {
                Arc::new(ProducerManager::new(broker.clone(), config, observer))
            }
            #[cfg(feature = "kafka")]
            Backend::KafkaThreaded => Arc::new(ProducerManager::new(ThreadedKafka, config, observer)),
            #[cfg(feature = "kafka")]
            Backend::KafkaStream => Arc::new(ProducerManager::new(StreamKafka, config, observer)),
        }
    }

    pub fn consumer(
        &self,
        config: ConsumerConfig,
        gateway: Arc<dyn OrderCreator>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Arc<dyn MessageConsumer> {
        match self {
            Backend::Memory(broker) => Arc::new(ConsumerManager::new(
                broker.clone(),
                config,
                gateway,
                observer,
            )),
            #[cfg(feature = "kafka")]
            Backend::KafkaThreaded => Arc::new(ConsumerManager::new(
                ThreadedKafka,
                config,
                gateway,
                observer,
            )),
            #[cfg(feature = "kafka")]
            Backend::KafkaStream => {
                Arc::new(ConsumerManager::new(StreamKafka, config, gateway, observer))
            }
        }
    }
}
