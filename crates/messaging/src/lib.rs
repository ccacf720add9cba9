//! Messaging lifecycle for the order ingestion service.
//!
//! This crate provides a uniform contract for starting, running and
//! gracefully stopping producers and consumers against a broker:
//! - `MessageProducer`: idempotent initialization, bulk publish, bounded shutdown
//! - `MessageConsumer`: a pool of workers sharing one cancellation token
//! - `ProducerManager` / `ConsumerManager`: the lifecycle logic, written once
//!   and generic over the connector seams in [`connector`]
//! - three broker adapters selected through [`Backend`]
//!
//! The Kafka adapters are compiled with the `kafka` feature.

pub mod adapters;
pub mod backend;
pub mod config;
pub mod connector;
pub mod consumer;
pub mod error;
pub mod observer;
pub mod producer;
pub mod record;
pub mod state;

pub use adapters::memory::InMemoryBroker;
pub use backend::{Backend, BrokerKind};
pub use config::{ConsumerConfig, OffsetReset, ProducerConfig};
pub use connector::{
    ConsumerConnector, ConsumerSession, DeliveryFailure, DeliveryReport, DeliveryReports,
    ProducerConnection, ProducerConnector,
};
pub use consumer::{ConsumerManager, MessageConsumer};
pub use error::{MessagingError, Result};
pub use observer::{LifecycleEvent, LifecycleObserver, RecordingObserver, TracingObserver};
pub use producer::{MessageProducer, ProducerManager};
pub use record::{ConsumedRecord, Record, RecordCoordinates};
pub use state::{ConsumerState, ProducerState};
pub use tokio_util::sync::CancellationToken;
