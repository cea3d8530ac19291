//! Batch publishing with a bounded flush.
//!
//! Every record of a batch is enqueued without blocking, then a single
//! flush waits for the broker to acknowledge all of them. A batch only
//! counts as sent once that flush succeeds.

use super::{key_strategy, serializer, BrokerProducer};
use crate::config::KafkaConfig;
use crate::Result;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// One application event.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Bytes sent exactly as given.
    Encoded(Bytes),
    /// A JSON value serialized before sending.
    Structured(Value),
}

impl Record {
    /// Builds a structured record from any serializable event.
    pub fn structured<T: Serialize>(event: &T) -> Result<Self> {
        Ok(Record::Structured(serde_json::to_value(event)?))
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record::Structured(value)
    }
}

impl From<Bytes> for Record {
    fn from(bytes: Bytes) -> Self {
        Record::Encoded(bytes)
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Record::Encoded(Bytes::from(bytes))
    }
}

impl From<String> for Record {
    fn from(text: String) -> Self {
        Record::Encoded(Bytes::from(text))
    }
}

/// One or more records sent together.
///
/// A single record converts into a one-element batch, so `send_data(r)`
/// and `send_data(vec![r])` are the same call. A JSON array converts into
/// one record per element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch(Vec<Record>);

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Record> for Batch {
    fn from(record: Record) -> Self {
        Batch(vec![record])
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Batch(records)
    }
}

impl From<Value> for Batch {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Batch(items.into_iter().map(Record::Structured).collect()),
            single => Batch(vec![Record::Structured(single)]),
        }
    }
}

impl From<Vec<Value>> for Batch {
    fn from(values: Vec<Value>) -> Self {
        Batch(values.into_iter().map(Record::Structured).collect())
    }
}

impl From<Bytes> for Batch {
    fn from(bytes: Bytes) -> Self {
        Batch(vec![Record::Encoded(bytes)])
    }
}

/// Sends batches to one topic through a [`BrokerProducer`].
#[derive(Debug, Clone)]
pub struct Publisher {
    topic: String,
    flush_timeout: Duration,
    max_events_per_request: usize,
}

impl Publisher {
    pub fn new(topic: impl Into<String>, config: &KafkaConfig) -> Self {
        Self {
            topic: topic.into(),
            flush_timeout: config.flush_timeout(),
            max_events_per_request: config.max_events_per_request.max(1),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sends every record without a partition key and waits for the flush.
    pub async fn send_data<P>(&self, producer: &P, batch: &Batch) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        self.publish(producer, batch.records(), None).await
    }

    /// Sends every record keyed by its `key_field` value and waits for the flush.
    pub async fn send_data_with_key<P>(&self, producer: &P, batch: &Batch, key_field: &str) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        self.publish(producer, batch.records(), Some(key_field)).await
    }

    /// Sends a large batch as sequential chunks of `max_events_per_request`.
    ///
    /// Each chunk is flushed before the next is enqueued. The first failing
    /// chunk stops the rest.
    pub async fn send_data_chunked<P>(
        &self,
        producer: &P,
        batch: &Batch,
        key_field: Option<&str>,
    ) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        let chunks = batch.records().chunks(self.max_events_per_request);
        let total = chunks.len();

        for (index, chunk) in chunks.enumerate() {
            if let Err(e) = self.publish(producer, chunk, key_field).await {
                warn!(
                    topic = %self.topic,
                    chunk = index + 1,
                    total,
                    "Chunk failed, skipping remaining chunks: {}",
                    e
                );
                return Err(e);
            }
        }

        Ok(())
    }

    async fn publish<P>(&self, producer: &P, records: &[Record], key_field: Option<&str>) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        let messages = records
            .iter()
            .map(|record| {
                let key = key_field.and_then(|field| key_strategy::extract_key(record, field));
                serializer::serialize(record).map(|payload| (key, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        for (key, payload) in messages {
            producer.produce(&self.topic, key.as_deref(), payload).await?;
        }

        producer.flush(self.flush_timeout).await?;
        debug!(topic = %self.topic, records = records.len(), "Batch flushed");
        Ok(())
    }
}
