//! Error types and result handling for resumable-exporter.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use resumable_exporter::{Error, Result};
//!
//! fn connect_to_broker() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_broker() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::position::Position;
use thiserror::Error;

/// The main error type for exporter operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration sources could not be read or deserialized.
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// ZooKeeper client error.
    #[error("ZooKeeper error: {0}")]
    ZooKeeper(#[from] zookeeper_client::Error),

    /// JSON serialization error when encoding records or positions.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Coordination store or broker unreachable at startup.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation was attempted before `connect()` completed.
    #[error("Exporter is not connected")]
    NotConnected,

    /// A checkpoint payload could not be encoded or decoded.
    #[error("Checkpoint codec error: {0}")]
    Codec(String),

    /// A record could not be handed to the producer.
    #[error("Publish error: {0}")]
    Publish(String),

    /// The bounded flush after a batch failed or timed out.
    ///
    /// The outcome of the batch is unknown; the position must not advance.
    #[error("Flush failed: {0}")]
    Flush(rdkafka::error::KafkaError),

    /// Transaction API used out of order (begin twice, commit without begin, ...).
    #[error("Transaction protocol error: {0}")]
    TransactionProtocol(String),

    /// The batch was acknowledged but persisting its position failed.
    ///
    /// Retry [`save_position`](crate::Exporter::save_position) with the
    /// carried position; the data does not need to be re-sent.
    #[error("Data acknowledged but position was not saved: {source}")]
    PositionNotSaved {
        /// Position that should have been persisted
        position: Position,
        /// Underlying store failure
        #[source]
        source: Box<Error>,
    },

    /// Metric construction or registration failed.
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },
}

impl Error {
    /// Returns true when the caller may retry without re-sending data.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::PositionNotSaved { .. })
    }
}

/// A convenient Result type alias for exporter operations.
///
/// This is equivalent to `std::result::Result<T, resumable_exporter::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
