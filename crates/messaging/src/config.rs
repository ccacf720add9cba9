//! Producer and consumer configuration.

use std::time::Duration;

use crate::{MessagingError, Result};

/// Broker address used when none is configured.
pub const DEFAULT_BROKERS: &str = "localhost:9092";

/// Topic the producer bursts into.
pub const DEFAULT_TOPIC: &str = "orders";

/// Records emitted per `publish_order` call.
pub const DEFAULT_BURST_SIZE: usize = 100_000;

/// Upper bound on the producer's drain before close.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single consumer poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Splits a comma-separated broker list, falling back to [`DEFAULT_BROKERS`].
pub fn parse_broker_list(raw: &str) -> Vec<String> {
    let brokers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if brokers.is_empty() {
        vec![DEFAULT_BROKERS.to_string()]
    } else {
        brokers
    }
}

/// Where a consumer group starts reading when it has no committed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl std::fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OffsetReset {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(MessagingError::InvalidConfig(format!(
                "unknown offset reset policy '{other}' (expected earliest or latest)"
            ))),
        }
    }
}

/// Consumer settings, shared by every worker a manager starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
    pub offset_reset: OffsetReset,
    pub poll_timeout: Duration,
}

impl ConsumerConfig {
    pub fn new(
        brokers: Vec<String>,
        group_id: impl Into<String>,
        topics: Vec<String>,
        offset_reset: OffsetReset,
    ) -> Self {
        Self {
            brokers,
            group_id: group_id.into(),
            topics,
            offset_reset,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Returns the brokers in `host:port,host:port` form.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Checks that a session could be opened with this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(MessagingError::InvalidConfig(
                "at least one broker is required".to_string(),
            ));
        }
        if self.group_id.trim().is_empty() {
            return Err(MessagingError::InvalidConfig(
                "consumer group id is required".to_string(),
            ));
        }
        if self.topics.is_empty() {
            return Err(MessagingError::InvalidConfig(
                "at least one topic is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new(
            vec![DEFAULT_BROKERS.to_string()],
            "order-consumers",
            vec![DEFAULT_TOPIC.to_string()],
            OffsetReset::Earliest,
        )
    }
}

/// Producer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub burst_size: usize,
    pub flush_timeout: Duration,
}

impl ProducerConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_burst_size(mut self, burst_size: usize) -> Self {
        self.burst_size = burst_size;
        self
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Returns the brokers in `host:port,host:port` form.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKERS.to_string()],
            topic: DEFAULT_TOPIC.to_string(),
            burst_size: DEFAULT_BURST_SIZE,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}
