//! Consumer lifecycle management.
//!
//! A [`ConsumerManager`] owns a pool of workers. Each worker opens its own
//! broker session, turns every record it receives into one order creation,
//! and exits once the shared [`CancellationToken`] fires.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::RecordKey;
use futures_util::future::join_all;
use orders::OrderCreator;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ConsumerConfig;
use crate::connector::{ConsumerConnector, ConsumerSession};
use crate::observer::{LifecycleEvent, LifecycleObserver};
use crate::record::ConsumedRecord;
use crate::state::ConsumerState;

/// Quantity given to every order created from a record.
const ORDER_QUANTITY: i32 = 1;

/// Uniform consumer contract.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Starts one worker bound to `cancel` and returns immediately.
    fn start(&self, cancel: CancellationToken);

    /// Blocks until every worker started so far has exited.
    ///
    /// Does not cancel anything by itself.
    async fn wait(&self);

    fn state(&self) -> ConsumerState;
}

#[derive(Debug, Default)]
struct PoolStatus {
    state: ConsumerState,
    active: usize,
    started: usize,
}

struct WorkerShared {
    config: ConsumerConfig,
    gateway: Arc<dyn OrderCreator>,
    observer: Arc<dyn LifecycleObserver>,
    status: Mutex<PoolStatus>,
}

impl WorkerShared {
    fn status(&self) -> std::sync::MutexGuard<'_, PoolStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the pool's active count honest, even if a worker panics.
struct ActiveWorker {
    shared: Arc<WorkerShared>,
}

impl ActiveWorker {
    fn draining(&self) {
        let mut status = self.shared.status();
        if status.state == ConsumerState::Running {
            status.state = ConsumerState::Draining;
        }
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        let mut status = self.shared.status();
        status.active = status.active.saturating_sub(1);
        if status.active == 0 {
            status.state = ConsumerState::Stopped;
        }
    }
}

/// Consumer lifecycle over any [`ConsumerConnector`].
pub struct ConsumerManager<C: ConsumerConnector> {
    connector: Arc<C>,
    shared: Arc<WorkerShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: ConsumerConnector> ConsumerManager<C> {
    pub fn new(
        connector: C,
        config: ConsumerConfig,
        gateway: Arc<dyn OrderCreator>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(WorkerShared {
                config,
                gateway,
                observer,
                status: Mutex::new(PoolStatus::default()),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.shared.config
    }

    /// Number of workers that have not yet exited.
    pub fn active_workers(&self) -> usize {
        self.shared.status().active
    }
}

#[async_trait]
impl<C: ConsumerConnector> MessageConsumer for ConsumerManager<C> {
    fn start(&self, cancel: CancellationToken) {
        let worker = {
            let mut status = self.shared.status();
            status.state = ConsumerState::Running;
            status.active += 1;
            status.started += 1;
            status.started
        };

        let guard = ActiveWorker {
            shared: Arc::clone(&self.shared),
        };
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.connector),
            guard,
            worker,
            cancel,
        ));

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    async fn wait(&self) {
        loop {
            let handles: Vec<_> = self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            if handles.is_empty() {
                return;
            }

            for result in join_all(handles).await {
                if let Err(err) = result {
                    self.shared
                        .observer
                        .record(LifecycleEvent::WorkerAborted {
                            error: err.to_string(),
                        });
                }
            }
        }
    }

    fn state(&self) -> ConsumerState {
        self.shared.status().state
    }
}

async fn run_worker<C: ConsumerConnector>(
    connector: Arc<C>,
    guard: ActiveWorker,
    worker: usize,
    cancel: CancellationToken,
) {
    let shared = Arc::clone(&guard.shared);
    let observer = &shared.observer;
    let adapter = connector.name();

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = connector.connect(&shared.config) => Some(result),
    };
    let session = match connected {
        None => return,
        Some(Ok(session)) => Arc::new(session),
        Some(Err(err)) => {
            observer.record(LifecycleEvent::WorkerConnectFailed {
                worker,
                adapter,
                error: err.to_string(),
            });
            return;
        }
    };

    observer.record(LifecycleEvent::WorkerStarted {
        worker,
        adapter,
        group_id: shared.config.group_id.clone(),
        topics: shared.config.topics.clone(),
    });

    // Closing the session is what unblocks a poll that cannot see the token.
    let closer_token = cancel.child_token();
    let closer = tokio::spawn({
        let session = Arc::clone(&session);
        let token = closer_token.clone();
        async move {
            token.cancelled().await;
            session.close().await;
        }
    });

    let mut processed = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = session.poll(shared.config.poll_timeout) => polled,
        };

        match polled {
            Ok(None) => continue,
            Ok(Some(record)) => {
                process_record(&shared, session.as_ref(), worker, record).await;
                processed += 1;
            }
            Err(err) => {
                if cancel.is_cancelled() {
                    break;
                }
                observer.record(LifecycleEvent::PollFailed {
                    worker,
                    error: err.to_string(),
                });
            }
        }
    }

    guard.draining();
    closer_token.cancel();
    if let Err(err) = closer.await {
        observer.record(LifecycleEvent::WorkerAborted {
            error: err.to_string(),
        });
    }

    observer.record(LifecycleEvent::WorkerStopped { worker, processed });
}

/// Creates one order for `record`, then commits it.
///
/// A creation failure is reported and the record still counts as consumed.
async fn process_record<S: ConsumerSession>(
    shared: &WorkerShared,
    session: &S,
    worker: usize,
    record: ConsumedRecord,
) {
    let started = Instant::now();
    let message_id = RecordKey::generate();
    let description = format!("Note-{message_id}");

    let (order_id, error) = match shared
        .gateway
        .create_order(&description, ORDER_QUANTITY)
        .await
    {
        Ok(id) => (Some(id), None),
        Err(err) => (None, Some(err.to_string())),
    };

    shared.observer.record(LifecycleEvent::RecordProcessed {
        worker,
        message_id,
        order_id,
        error,
        processing_time: started.elapsed(),
        coordinates: record.coordinates.clone(),
    });

    if let Err(err) = session.commit(&record).await {
        shared.observer.record(LifecycleEvent::CommitFailed {
            worker,
            coordinates: record.coordinates,
            error: err.to_string(),
        });
    }
}
