//! Application configuration loaded from environment variables.

use std::time::Duration;

use message_bus::KafkaSettings;
use saga::{RetryPolicy, SagaSettings};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `BUS_BROKERS`: Kafka bootstrap servers; without it the bus runs in-process
/// - `BUS_CLIENT_ID`: prefix of every consumer group (default: `"checkout"`)
/// - `BUS_PARTITIONS`: partitions per topic (default: `3`)
/// - `BUS_REPLICATION`: replication factor of created Kafka topics (default: `1`)
/// - `COMPLETION_MAX_ATTEMPTS`: completion commit attempts (default: `5`)
/// - `COMPLETION_BACKOFF_MS`: pause between completion attempts (default: `1000`)
/// - `COMPLETION_ATTEMPT_TIMEOUT_MS`: deadline per attempt (default: `5000`)
/// - `REDELIVERY_DELAY_MS`: first pause before a failed message is redelivered (default: `200`)
/// - `DATABASE_URL`: when set, saga progress is kept in PostgreSQL
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub bus_brokers: Option<String>,
    pub bus_client_id: String,
    pub bus_partitions: usize,
    pub bus_replication: i32,
    pub completion_max_attempts: u32,
    pub completion_backoff: Duration,
    pub completion_attempt_timeout: Duration,
    pub redelivery_delay: Duration,
    pub database_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            bus_brokers: lookup("BUS_BROKERS").filter(|v| !v.trim().is_empty()),
            bus_client_id: lookup("BUS_CLIENT_ID")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.bus_client_id),
            bus_partitions: parsed("BUS_PARTITIONS")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.bus_partitions),
            bus_replication: parsed("BUS_REPLICATION")
                .and_then(|v| i32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.bus_replication),
            completion_max_attempts: parsed("COMPLETION_MAX_ATTEMPTS")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.completion_max_attempts),
            completion_backoff: parsed("COMPLETION_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.completion_backoff),
            completion_attempt_timeout: parsed("COMPLETION_ATTEMPT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.completion_attempt_timeout),
            redelivery_delay: parsed("REDELIVERY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redelivery_delay),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Kafka settings, if a broker address is configured.
    pub fn kafka_settings(&self) -> Option<KafkaSettings> {
        let brokers = self.bus_brokers.as_ref()?;
        let mut settings = KafkaSettings::new(brokers.clone());
        settings.partitions = i32::try_from(self.bus_partitions).unwrap_or(settings.partitions);
        settings.replication = self.bus_replication;
        Some(settings)
    }

    /// Saga runtime settings derived from this configuration.
    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            client_id: self.bus_client_id.clone(),
            retry: RetryPolicy::new(
                self.completion_max_attempts,
                self.completion_backoff,
                self.completion_attempt_timeout,
            ),
            redelivery_delay: self.redelivery_delay,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            bus_brokers: None,
            bus_client_id: saga::runtime::DEFAULT_CLIENT_ID.to_string(),
            bus_partitions: message_bus::DEFAULT_PARTITIONS,
            bus_replication: 1,
            completion_max_attempts: retry.max_attempts,
            completion_backoff: retry.backoff,
            completion_attempt_timeout: retry.attempt_timeout,
            redelivery_delay: message_bus::DEFAULT_REDELIVERY_DELAY,
            database_url: None,
        }
    }
}
