//! Seams each broker adapter implements.
//!
//! The lifecycle managers are written once against these traits; an adapter
//! only has to say how to connect, send, poll, commit and close.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::record::{ConsumedRecord, Record, RecordCoordinates};
use crate::Result;

/// A record the broker reported as undeliverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub topic: String,
    pub reason: String,
}

/// Outcome of one asynchronous delivery.
pub type DeliveryReport = std::result::Result<RecordCoordinates, DeliveryFailure>;

/// Delivery reports for one producer connection.
///
/// The channel closes once the connection has been closed and dropped.
pub type DeliveryReports = mpsc::UnboundedReceiver<DeliveryReport>;

/// Opens producer connections.
#[async_trait]
pub trait ProducerConnector: Send + Sync + 'static {
    type Connection: ProducerConnection;

    /// Short adapter name used in events.
    fn name(&self) -> &'static str;

    /// Opens a connection and the stream of its delivery reports.
    async fn connect(
        &self,
        config: &ProducerConfig,
    ) -> Result<(Self::Connection, DeliveryReports)>;
}

/// An open producer connection.
#[async_trait]
pub trait ProducerConnection: Send + Sync + 'static {
    /// Hands one record to the broker, waiting out transport backpressure.
    async fn send(&self, topic: &str, record: Record) -> Result<()>;

    /// Waits for in-flight records and returns how many were still undelivered at `timeout`.
    async fn flush(&self, timeout: Duration) -> usize;

    /// Releases the connection. Sends after this fail.
    async fn close(&self);
}

/// Opens consumer sessions.
#[async_trait]
pub trait ConsumerConnector: Send + Sync + 'static {
    type Session: ConsumerSession;

    /// Short adapter name used in events.
    fn name(&self) -> &'static str;

    /// Joins the configured group and subscribes to its topics.
    async fn connect(&self, config: &ConsumerConfig) -> Result<Self::Session>;
}

/// An open consumer session.
#[async_trait]
pub trait ConsumerSession: Send + Sync + 'static {
    /// Returns the next record, or `None` if nothing arrived within `timeout`.
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>>;

    /// Marks `record` as processed for the group.
    async fn commit(&self, record: &ConsumedRecord) -> Result<()>;

    /// Leaves the group. A poll blocked in another task returns promptly.
    async fn close(&self);
}
