pub mod delivery;
pub mod key_strategy;
pub mod producer;
pub mod publisher;
pub mod serializer;
pub mod transaction;


pub use delivery::{DeliveryFailure, DeliveryHandler, DeliveryReports};
pub use producer::KafkaProducer;
pub use publisher::{Batch, Publisher, Record};
pub use transaction::{TransactionController, TransactionState};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Broker primitives the publisher and transaction controller rely on.
///
/// `produce` only enqueues; nothing is known to be delivered until a
/// subsequent `flush` returns `Ok`.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Creates the client session and returns once the broker is reachable.
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn produce(&self, topic: &str, key: Option<&str>, payload: Bytes) -> Result<()>;

    async fn flush(&self, timeout: Duration) -> Result<()>;

    async fn init_transactions(&self, timeout: Duration) -> Result<()>;

    async fn begin_transaction(&self) -> Result<()>;

    async fn commit_transaction(&self, timeout: Duration) -> Result<()>;

    async fn abort_transaction(&self, timeout: Duration) -> Result<()>;
}
