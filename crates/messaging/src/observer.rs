//! Structured lifecycle events and the sinks that receive them.
//!
//! Managers never log directly. They hand a [`LifecycleEvent`] to the
//! injected [`LifecycleObserver`], which keeps them testable without a live
//! logging backend.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::{OrderId, RecordKey};

use crate::record::RecordCoordinates;

/// Something notable that happened in a producer or consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    ProducerInitialized {
        adapter: &'static str,
        brokers: String,
    },
    ProducerConnectFailed {
        adapter: &'static str,
        error: String,
    },
    RecordDelivered {
        coordinates: RecordCoordinates,
    },
    DeliveryFailed {
        topic: String,
        error: String,
    },
    BurstCompleted {
        order_id: String,
        records: usize,
        elapsed: Duration,
    },
    PublishFailed {
        order_id: String,
        sent: usize,
        error: String,
    },
    RecordsUnflushed {
        count: usize,
    },
    ProducerClosed {
        adapter: &'static str,
    },
    ShutdownCompleted {
        adapter: &'static str,
    },
    ShutdownTimedOut {
        adapter: &'static str,
    },
    WorkerStarted {
        worker: usize,
        adapter: &'static str,
        group_id: String,
        topics: Vec<String>,
    },
    WorkerConnectFailed {
        worker: usize,
        adapter: &'static str,
        error: String,
    },
    RecordProcessed {
        worker: usize,
        message_id: RecordKey,
        order_id: Option<OrderId>,
        error: Option<String>,
        processing_time: Duration,
        coordinates: RecordCoordinates,
    },
    PollFailed {
        worker: usize,
        error: String,
    },
    CommitFailed {
        worker: usize,
        coordinates: RecordCoordinates,
        error: String,
    },
    WorkerStopped {
        worker: usize,
        processed: u64,
    },
    WorkerAborted {
        error: String,
    },
}

/// Sink for lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    fn record(&self, event: LifecycleEvent);
}

/// Production sink: structured `tracing` events plus Prometheus metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn LifecycleObserver> {
        Arc::new(Self)
    }
}

impl LifecycleObserver for TracingObserver {
    fn record(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::ProducerInitialized { adapter, brokers } => {
                tracing::info!(adapter, %brokers, "producer initialized");
            }
            LifecycleEvent::ProducerConnectFailed { adapter, error } => {
                tracing::error!(adapter, %error, "failed to initialize producer");
            }
            LifecycleEvent::RecordDelivered { coordinates } => {
                tracing::debug!(
                    topic = %coordinates.topic,
                    partition = coordinates.partition,
                    offset = coordinates.offset,
                    "record delivered"
                );
            }
            LifecycleEvent::DeliveryFailed { topic, error } => {
                metrics::counter!("messaging_delivery_failures_total").increment(1);
                tracing::error!(%topic, %error, "failed to deliver record");
            }
            LifecycleEvent::BurstCompleted {
                order_id,
                records,
                elapsed,
            } => {
                metrics::counter!("messaging_records_published_total").increment(records as u64);
                tracing::info!(
                    %order_id,
                    records,
                    processing_time_ms = elapsed.as_millis() as u64,
                    "completed sending records"
                );
            }
            LifecycleEvent::PublishFailed {
                order_id,
                sent,
                error,
            } => {
                metrics::counter!("messaging_publish_failures_total").increment(1);
                metrics::counter!("messaging_records_published_total").increment(sent as u64);
                tracing::error!(%order_id, sent, %error, "failed to publish record");
            }
            LifecycleEvent::RecordsUnflushed { count } => {
                tracing::warn!(count, "records were not flushed before timeout");
            }
            LifecycleEvent::ProducerClosed { adapter } => {
                tracing::info!(adapter, "producer connection closed");
            }
            LifecycleEvent::ShutdownCompleted { adapter } => {
                tracing::info!(adapter, "producer shutdown completed");
            }
            LifecycleEvent::ShutdownTimedOut { adapter } => {
                metrics::counter!("messaging_producer_shutdown_timeouts_total").increment(1);
                tracing::warn!(adapter, "producer shutdown timed out");
            }
            LifecycleEvent::WorkerStarted {
                worker,
                adapter,
                group_id,
                topics,
            } => {
                tracing::info!(
                    worker,
                    adapter,
                    %group_id,
                    ?topics,
                    "consumer started and waiting for records"
                );
            }
            LifecycleEvent::WorkerConnectFailed {
                worker,
                adapter,
                error,
            } => {
                tracing::error!(worker, adapter, %error, "failed to create consumer session");
            }
            LifecycleEvent::RecordProcessed {
                worker,
                message_id,
                order_id,
                error,
                processing_time,
                coordinates,
            } => {
                metrics::histogram!("messaging_record_processing_seconds")
                    .record(processing_time.as_secs_f64());
                let processing_time_ms = processing_time.as_millis() as u64;
                match error {
                    None => {
                        metrics::counter!("messaging_records_processed_total", "outcome" => "created")
                            .increment(1);
                        tracing::info!(
                            worker,
                            %message_id,
                            order_id = ?order_id,
                            processing_time_ms,
                            topic = %coordinates.topic,
                            partition = coordinates.partition,
                            offset = coordinates.offset,
                            "record processed"
                        );
                    }
                    Some(error) => {
                        metrics::counter!("messaging_records_processed_total", "outcome" => "failed")
                            .increment(1);
                        tracing::error!(
                            worker,
                            %message_id,
                            %error,
                            processing_time_ms,
                            topic = %coordinates.topic,
                            partition = coordinates.partition,
                            offset = coordinates.offset,
                            "error creating order"
                        );
                    }
                }
            }
            LifecycleEvent::PollFailed { worker, error } => {
                tracing::error!(worker, %error, "consumer error");
            }
            LifecycleEvent::CommitFailed {
                worker,
                coordinates,
                error,
            } => {
                tracing::error!(worker, %coordinates, %error, "failed to commit record");
            }
            LifecycleEvent::WorkerStopped { worker, processed } => {
                tracing::info!(worker, processed, "consumer loop exited");
            }
            LifecycleEvent::WorkerAborted { error } => {
                tracing::error!(%error, "consumer worker aborted");
            }
        }
    }
}

/// Sink that keeps every event in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counts recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    /// Returns every `RecordProcessed` event, in arrival order.
    pub fn processed(&self) -> Vec<LifecycleEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, LifecycleEvent::RecordProcessed { .. }))
            .collect()
    }

    pub fn shutdown_timed_out(&self) -> bool {
        self.count(|e| matches!(e, LifecycleEvent::ShutdownTimedOut { .. })) > 0
    }
}

impl LifecycleObserver for RecordingObserver {
    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
