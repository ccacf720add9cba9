//! Kafka adapters built on `rdkafka`.
//!
//! - [`ThreadedKafka`]: `ThreadedProducer` with a delivery callback and a
//!   `BaseConsumer` relying on auto-commit
//! - [`StreamKafka`]: `FutureProducer` awaiting each delivery and a
//!   `StreamConsumer` committing every record explicitly

mod stream;
mod threaded;

pub use stream::StreamKafka;
pub use threaded::ThreadedKafka;

use rdkafka::ClientConfig;
use rdkafka::message::Message;

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::record::{ConsumedRecord, RecordCoordinates};

fn producer_client_config(config: &ProducerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("acks", "all")
        .set("message.send.max.retries", "5")
        .set("batch.size", "1000000");
    client
}

/// With `auto_commit`, the timer commits only offsets the session stored
/// explicitly, so a record is never committed before it was processed.
fn consumer_client_config(config: &ConsumerConfig, auto_commit: bool) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", config.offset_reset.as_str())
        .set("enable.auto.commit", if auto_commit { "true" } else { "false" })
        .set("enable.auto.offset.store", "false");
    client
}

fn topic_refs(config: &ConsumerConfig) -> Vec<&str> {
    config.topics.iter().map(String::as_str).collect()
}

fn to_consumed<M: Message>(message: &M) -> ConsumedRecord {
    ConsumedRecord {
        key: message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned()),
        value: message
            .payload()
            .map(|payload| String::from_utf8_lossy(payload).into_owned()),
        coordinates: RecordCoordinates::new(message.topic(), message.partition(), message.offset()),
    }
}
