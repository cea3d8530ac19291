use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Flat environment variables honoured for compatibility with existing
/// deployments, mapped onto their nested configuration keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("ZOOKEEPER_URL", "zookeeper.url"),
    ("KAFKA_URL", "kafka.url"),
    ("KAFKA_COMPRESSION_CODEC", "kafka.compression_codec"),
    ("KAFKA_FLUSH_TIMEOUT", "kafka.flush_timeout_ms"),
    ("BUFFERING_MAX_MESSAGES", "kafka.buffering_max_messages"),
    ("KAFKA_MESSAGE_MAX_BYTES", "kafka.message_max_bytes"),
    ("KAFKA_TOPIC", "kafka.topic"),
];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub zookeeper: ZooKeeperConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZooKeeperConfig {
    #[serde(default = "default_zookeeper_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_url")]
    pub url: String,
    /// Explicit topic; derived from the exporter name when unset.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_compression")]
    pub compression_codec: String,
    #[serde(default = "default_buffering_max_messages")]
    pub buffering_max_messages: u64,
    #[serde(default = "default_message_max_bytes")]
    pub message_max_bytes: u64,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_events_per_request")]
    pub max_events_per_request: usize,
    /// Enables `transactional.id` and `enable.idempotence` on the producer.
    #[serde(default)]
    pub transactional: bool,
}

impl Default for ZooKeeperConfig {
    fn default() -> Self {
        Self {
            url: default_zookeeper_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            url: default_kafka_url(),
            topic: None,
            compression_codec: default_compression(),
            buffering_max_messages: default_buffering_max_messages(),
            message_max_bytes: default_message_max_bytes(),
            flush_timeout_ms: default_flush_timeout_ms(),
            transaction_timeout_ms: default_transaction_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_events_per_request: default_max_events_per_request(),
            transactional: false,
        }
    }
}

impl Config {
    /// Loads configuration from `EXPORTER_*` and legacy environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Loads configuration from a file, with environment variables layered on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("EXPORTER")
                .prefix_separator("_")
                .separator("__"),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zookeeper.url.trim().is_empty() {
            return Err(Error::Config("zookeeper.url must not be empty".to_string()));
        }
        if self.kafka.url.trim().is_empty() {
            return Err(Error::Config("kafka.url must not be empty".to_string()));
        }

        let timeouts = [
            ("zookeeper.connect_timeout_ms", self.zookeeper.connect_timeout_ms),
            ("kafka.connect_timeout_ms", self.kafka.connect_timeout_ms),
            ("kafka.flush_timeout_ms", self.kafka.flush_timeout_ms),
            ("kafka.transaction_timeout_ms", self.kafka.transaction_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }

        if self.kafka.max_events_per_request == 0 {
            return Err(Error::Config(
                "kafka.max_events_per_request must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl ZooKeeperConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl KafkaConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_zookeeper_url() -> String {
    "localhost:2181".to_string()
}

fn default_kafka_url() -> String {
    "localhost:9092".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_buffering_max_messages() -> u64 {
    150_000
}

fn default_message_max_bytes() -> u64 {
    10_485_760 // 10MB
}

fn default_flush_timeout_ms() -> u64 {
    5_000
}

fn default_transaction_timeout_ms() -> u64 {
    2_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_events_per_request() -> usize {
    10_000
}
