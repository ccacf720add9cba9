//! Application configuration loaded from environment variables.

use std::time::Duration;

use messaging::config::{DEFAULT_BURST_SIZE, DEFAULT_TOPIC, parse_broker_list};
use messaging::{BrokerKind, ConsumerConfig, OffsetReset, ProducerConfig};
use orders::DatabaseConfig;

use crate::error::StartupError;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(StartupError::Config(format!(
                "unknown log format '{other}' (expected json or pretty)"
            ))),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:8081`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` or `pretty` (default: `json`)
/// - `BROKER_ADAPTER`: `memory`, `kafka-threaded` or `kafka-stream` (default: `memory`)
/// - `KAFKA_BROKERS`, `KAFKA_GROUP_ID`, `KAFKA_TOPICS`, `KAFKA_OFFSET_RESET`
/// - `PRODUCER_TOPIC`, `PUBLISH_BURST_SIZE`
/// - `CONSUMER_WORKERS` (default: 6)
/// - `SHUTDOWN_TIMEOUT_SECS` (default: 10)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS` (default: 25 / 10)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub broker: BrokerKind,
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
    pub offset_reset: OffsetReset,
    pub producer_topic: String,
    pub burst_size: usize,
    pub consumer_workers: usize,
    pub shutdown_timeout: Duration,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable numbers fall back to their default; an unknown adapter,
    /// offset policy or log format is an error.
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StartupError> {
        let defaults = Self::default();

        let broker = match lookup("BROKER_ADAPTER") {
            Some(raw) => raw.parse()?,
            None => defaults.broker,
        };
        let offset_reset = match lookup("KAFKA_OFFSET_RESET") {
            Some(raw) => raw.parse()?,
            None => defaults.offset_reset,
        };
        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => defaults.log_format,
        };

        let db_max_connections =
            parse_var(&lookup, "DB_MAX_CONNECTIONS").unwrap_or(defaults.db_max_connections);
        let db_min_connections = match parse_var::<u32>(&lookup, "DB_MIN_CONNECTIONS") {
            Some(min) if min > db_max_connections => {
                return Err(StartupError::Config(format!(
                    "DB_MIN_CONNECTIONS ({min}) exceeds DB_MAX_CONNECTIONS ({db_max_connections})"
                )));
            }
            Some(min) => min,
            None => defaults.db_min_connections.min(db_max_connections),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            broker,
            brokers: lookup("KAFKA_BROKERS")
                .map(|raw| parse_broker_list(&raw))
                .unwrap_or(defaults.brokers),
            group_id: lookup("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            topics: lookup("KAFKA_TOPICS")
                .map(|raw| split_list(&raw))
                .filter(|topics| !topics.is_empty())
                .unwrap_or(defaults.topics),
            offset_reset,
            producer_topic: lookup("PRODUCER_TOPIC").unwrap_or(defaults.producer_topic),
            burst_size: parse_var(&lookup, "PUBLISH_BURST_SIZE").unwrap_or(defaults.burst_size),
            consumer_workers: parse_var(&lookup, "CONSUMER_WORKERS")
                .unwrap_or(defaults.consumer_workers),
            shutdown_timeout: parse_var(&lookup, "SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections,
            db_min_connections,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig::new(self.brokers.clone())
            .with_topic(self.producer_topic.clone())
            .with_burst_size(self.burst_size)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::new(
            self.brokers.clone(),
            self.group_id.clone(),
            self.topics.clone(),
            self.offset_reset,
        )
    }

    /// Pool settings, when a database URL is configured.
    pub fn database_config(&self) -> Option<DatabaseConfig> {
        self.database_url.as_ref().map(|url| {
            let mut config = DatabaseConfig::new(url.clone());
            config.max_connections = self.db_max_connections;
            config.min_connections = self.db_min_connections;
            config
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let consumer = ConsumerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            broker: BrokerKind::Memory,
            brokers: consumer.brokers,
            group_id: consumer.group_id,
            topics: consumer.topics,
            offset_reset: consumer.offset_reset,
            producer_topic: DEFAULT_TOPIC.to_string(),
            burst_size: DEFAULT_BURST_SIZE,
            consumer_workers: 6,
            shutdown_timeout: Duration::from_secs(10),
            database_url: None,
            db_max_connections: 25,
            db_min_connections: 10,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
