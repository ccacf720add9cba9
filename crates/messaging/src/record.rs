//! Broker payload types.

use common::RecordKey;

/// One outbound unit of broker payload.
///
/// The key is a fresh unique token and the value is an order identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: RecordKey,
    pub value: String,
}

impl Record {
    /// Creates a record with the given key and value.
    pub fn new(key: RecordKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Creates a record for `order_id` under a freshly generated key.
    pub fn for_order(order_id: &str) -> Self {
        Self::new(RecordKey::generate(), order_id)
    }
}

/// Where a record lives on the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordCoordinates {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl RecordCoordinates {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl std::fmt::Display for RecordCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// A record as delivered to a consumer.
///
/// Key and value are decoded lossily; a consumer may see records written
/// by other producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub key: Option<String>,
    pub value: Option<String>,
    pub coordinates: RecordCoordinates,
}
