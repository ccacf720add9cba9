//! In-process broker.
//!
//! Each topic is a single-partition append-only log. Consumer groups keep a
//! fetch position and a committed offset per topic; when the last session of
//! a group closes, the fetch position falls back to the committed offset so
//! uncommitted records are delivered again.
//!
//! Records below the lowest offset still needed by any group that has read
//! the topic are dropped on commit. Offsets never shift; the log only
//! remembers where its first retained record sits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ConsumerConfig, OffsetReset, ProducerConfig};
use crate::connector::{
    ConsumerConnector, ConsumerSession, DeliveryReport, DeliveryReports, ProducerConnection,
    ProducerConnector,
};
use crate::record::{ConsumedRecord, Record, RecordCoordinates};
use crate::{MessagingError, Result};

const PARTITION: i32 = 0;

#[derive(Debug, Default)]
struct GroupState {
    positions: HashMap<String, i64>,
    committed: HashMap<String, i64>,
    active_sessions: usize,
}

#[derive(Debug, Default)]
struct TopicLog {
    base: i64,
    entries: VecDeque<Record>,
}

impl TopicLog {
    fn end(&self) -> i64 {
        self.base + self.entries.len() as i64
    }

    fn get(&self, offset: i64) -> Option<&Record> {
        if offset < self.base {
            return None;
        }
        self.entries.get((offset - self.base) as usize)
    }

    fn trim_to(&mut self, floor: i64) {
        let floor = floor.min(self.end());
        while self.base < floor {
            self.entries.pop_front();
            self.base += 1;
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    groups: HashMap<String, GroupState>,
    unavailable: bool,
    fail_send_after: Option<usize>,
    close_delay: Duration,
    producer_connections: usize,
    consumer_sessions: usize,
}

#[derive(Debug, Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    appended: Notify,
}

/// Broker that lives entirely inside the process.
///
/// Clones share the same topics and groups. It acts as both the producer
/// and the consumer connector for the `memory` adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `record` to `topic` and wakes waiting consumers.
    pub fn append(&self, topic: &str, record: Record) -> RecordCoordinates {
        let offset = {
            let mut state = self.state();
            let log = state.topics.entry(topic.to_string()).or_default();
            log.entries.push_back(record);
            log.end() - 1
        };
        self.inner.appended.notify_waiters();
        RecordCoordinates::new(topic, PARTITION, offset)
    }

    /// Records ever appended to `topic`, including trimmed ones.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.state().topics.get(topic).map_or(0, |log| log.end() as usize)
    }

    /// Records of `topic` still held in memory.
    pub fn retained(&self, topic: &str) -> usize {
        self.state().topics.get(topic).map_or(0, |log| log.entries.len())
    }

    /// Returns a copy of every retained record in `topic`.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.state()
            .topics
            .get(topic)
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Next offset `group` will resume from in `topic`, if it ever committed.
    pub fn committed_offset(&self, group: &str, topic: &str) -> Option<i64> {
        self.state()
            .groups
            .get(group)
            .and_then(|g| g.committed.get(topic).copied())
    }

    /// Makes every new connection or session fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Lets `sent` more sends succeed, then fails the next one once.
    pub fn fail_send_after(&self, sent: usize) {
        self.state().fail_send_after = Some(sent);
    }

    /// Delays every producer close by `delay`.
    pub fn set_close_delay(&self, delay: Duration) {
        self.state().close_delay = delay;
    }

    /// Producer connections opened so far.
    pub fn producer_connections(&self) -> usize {
        self.state().producer_connections
    }

    /// Consumer sessions opened so far.
    pub fn consumer_sessions(&self) -> usize {
        self.state().consumer_sessions
    }

    fn fetch(&self, group: &str, topics: &[String], reset: OffsetReset) -> Option<ConsumedRecord> {
        let mut state = self.state();
        let BrokerState { topics: logs, groups, .. } = &mut *state;
        let group = groups.entry(group.to_string()).or_default();

        for topic in topics {
            let Some(log) = logs.get(topic.as_str()) else {
                continue;
            };
            let committed = group.committed.get(topic).copied();
            let position = group.positions.entry(topic.clone()).or_insert_with(|| {
                committed.unwrap_or(match reset {
                    OffsetReset::Earliest => log.base,
                    OffsetReset::Latest => log.end(),
                })
            });
            if *position < log.base {
                *position = log.base;
            }

            if let Some(record) = log.get(*position) {
                let coordinates = RecordCoordinates::new(topic.as_str(), PARTITION, *position);
                *position += 1;
                return Some(ConsumedRecord {
                    key: Some(record.key.to_string()),
                    value: Some(record.value.clone()),
                    coordinates,
                });
            }
        }

        None
    }

    /// Drops records of `topic` that no group reading it can still need.
    ///
    /// A group that has read the topic but never committed pins the whole
    /// log, since it would restart from the beginning.
    fn trim(state: &mut BrokerState, topic: &str) {
        let BrokerState { topics: logs, groups, .. } = state;
        let Some(log) = logs.get_mut(topic) else {
            return;
        };

        let floor = groups
            .values()
            .filter(|g| g.positions.contains_key(topic) || g.committed.contains_key(topic))
            .map(|g| g.committed.get(topic).copied().unwrap_or(log.base))
            .min();

        if let Some(floor) = floor {
            log.trim_to(floor);
        }
    }
}

/// Producer connection to an [`InMemoryBroker`].
pub struct MemoryConnection {
    broker: InMemoryBroker,
    reports: Mutex<Option<mpsc::UnboundedSender<DeliveryReport>>>,
}

#[async_trait]
impl ProducerConnector for InMemoryBroker {
    type Connection = MemoryConnection;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(
        &self,
        _config: &ProducerConfig,
    ) -> Result<(Self::Connection, DeliveryReports)> {
        let mut state = self.state();
        if state.unavailable {
            return Err(MessagingError::Connection("broker unavailable".to_string()));
        }
        state.producer_connections += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = MemoryConnection {
            broker: self.clone(),
            reports: Mutex::new(Some(tx)),
        };
        Ok((connection, rx))
    }
}

#[async_trait]
impl ProducerConnection for MemoryConnection {
    async fn send(&self, topic: &str, record: Record) -> Result<()> {
        let reports = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MessagingError::Send("connection closed".to_string()))?;

        {
            let mut state = self.broker.state();
            match state.fail_send_after {
                Some(0) => {
                    state.fail_send_after = None;
                    return Err(MessagingError::Send("injected send failure".to_string()));
                }
                Some(remaining) => state.fail_send_after = Some(remaining - 1),
                None => {}
            }
        }

        let coordinates = self.broker.append(topic, record);
        let _ = reports.send(Ok(coordinates));
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> usize {
        0
    }

    async fn close(&self) {
        let delay = self.broker.state().close_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Consumer session against an [`InMemoryBroker`].
pub struct MemorySession {
    broker: InMemoryBroker,
    group: String,
    topics: Vec<String>,
    reset: OffsetReset,
    closed: CancellationToken,
    released: AtomicBool,
}

#[async_trait]
impl ConsumerConnector for InMemoryBroker {
    type Session = MemorySession;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, config: &ConsumerConfig) -> Result<Self::Session> {
        config.validate()?;

        let mut state = self.state();
        if state.unavailable {
            return Err(MessagingError::Connection("broker unavailable".to_string()));
        }
        state.consumer_sessions += 1;
        state
            .groups
            .entry(config.group_id.clone())
            .or_default()
            .active_sessions += 1;

        Ok(MemorySession {
            broker: self.clone(),
            group: config.group_id.clone(),
            topics: config.topics.clone(),
            reset: config.offset_reset,
            closed: CancellationToken::new(),
            released: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ConsumerSession for MemorySession {
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before looking, so an append in between is not missed.
            let notified = self.broker.inner.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.is_cancelled() {
                return Ok(None);
            }
            if let Some(record) = self.broker.fetch(&self.group, &self.topics, self.reset) {
                return Ok(Some(record));
            }

            tokio::select! {
                _ = &mut notified => continue,
                _ = self.closed.cancelled() => return Ok(None),
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<()> {
        let next = record.coordinates.offset + 1;
        let mut state = self.broker.state();
        let group = state.groups.entry(self.group.clone()).or_default();
        let committed = group
            .committed
            .entry(record.coordinates.topic.clone())
            .or_insert(next);
        *committed = (*committed).max(next);
        InMemoryBroker::trim(&mut state, &record.coordinates.topic);
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.broker.state();
        if let Some(group) = state.groups.get_mut(&self.group) {
            group.active_sessions = group.active_sessions.saturating_sub(1);
            if group.active_sessions == 0 {
                group.positions.clear();
            }
        }
    }
}
