use super::delivery::{DeliveryFailure, DeliveryReports};
use super::BrokerProducer;
use crate::{config::KafkaConfig, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::client::ClientContext;
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{error, info, trace, warn};

const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Client context forwarding delivery failures to [`DeliveryReports`].
pub struct ExportContext {
    reports: DeliveryReports,
}

impl ClientContext for ExportContext {
    fn error(&self, error: KafkaError, reason: &str) {
        error!(error = %error, "Kafka client error: {}", reason);
    }
}

impl ProducerContext for ExportContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match delivery_result {
            Ok(message) => trace!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Message delivered"
            ),
            Err((error, message)) => self.reports.report(DeliveryFailure {
                topic: message.topic().to_string(),
                partition: message.partition(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                reason: error.to_string(),
            }),
        }
    }
}

type InnerProducer = ThreadedProducer<ExportContext>;

/// [`BrokerProducer`] backed by librdkafka.
///
/// The client is built on `connect` and dropped on `disconnect`. Blocking
/// librdkafka calls run on the blocking thread pool.
pub struct KafkaProducer {
    client_config: ClientConfig,
    url: String,
    connect_timeout: Duration,
    flush_timeout: Duration,
    reports: DeliveryReports,
    producer: Option<Arc<InnerProducer>>,
}

impl KafkaProducer {
    /// Prepares a producer for `client_id`.
    ///
    /// A `transactional_id` switches on transactional mode, which also
    /// enables idempotence.
    pub fn new(
        client_id: &str,
        transactional_id: Option<String>,
        config: &KafkaConfig,
        reports: DeliveryReports,
    ) -> Self {
        let mut client_config = ClientConfig::new();
        client_config
            .set("metadata.broker.list", &config.url)
            .set("client.id", client_id)
            .set("compression.codec", &config.compression_codec)
            .set(
                "queue.buffering.max.messages",
                config.buffering_max_messages.to_string(),
            )
            .set("message.max.bytes", config.message_max_bytes.to_string());

        if let Some(transactional_id) = transactional_id {
            client_config
                .set("transactional.id", transactional_id)
                .set("enable.idempotence", "true");
        }

        Self {
            client_config,
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            flush_timeout: config.flush_timeout(),
            reports,
            producer: None,
        }
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    fn producer(&self) -> Result<Arc<InnerProducer>> {
        self.producer.clone().ok_or(Error::NotConnected)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<KafkaResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&InnerProducer) -> KafkaResult<T> + Send + 'static,
    {
        let producer = self.producer()?;
        task::spawn_blocking(move || op(&producer))
            .await
            .map_err(|e| Error::Connection(format!("kafka client task failed: {}", e)))
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to kafka host {}", self.url);

        let context = ExportContext {
            reports: self.reports.clone(),
        };
        let producer: InnerProducer = self.client_config.create_with_context(context)?;
        self.producer = Some(Arc::new(producer));

        let timeout = self.connect_timeout;
        let ready = self
            .blocking(move |producer| producer.client().fetch_metadata(None, timeout).map(|_| ()))
            .await;

        match ready {
            Ok(Ok(())) => {
                info!("Kafka producer ready at {}", self.url);
                Ok(())
            }
            Ok(Err(e)) => {
                self.producer = None;
                Err(Error::Connection(format!("kafka at {}: {}", self.url, e)))
            }
            Err(e) => {
                self.producer = None;
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };

        let timeout = self.flush_timeout;
        let flushed = task::spawn_blocking(move || {
            let result = producer.flush(timeout);
            drop(producer);
            result
        })
        .await
        .map_err(|e| Error::Connection(format!("kafka client task failed: {}", e)))?;

        if let Err(e) = flushed {
            warn!("Outstanding messages not flushed before disconnect: {}", e);
        }
        info!("Disconnected from kafka host {}", self.url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    async fn produce(&self, topic: &str, key: Option<&str>, payload: Bytes) -> Result<()> {
        let producer = self.producer()?;

        loop {
            let sent = {
                let mut record = BaseRecord::<str, [u8]>::to(topic).payload(&payload[..]);
                if let Some(key) = key {
                    record = record.key(key);
                }
                producer.send(record).map_err(|(e, _record)| e)
            };

            match sent {
                Ok(()) => return Ok(()),
                Err(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull)) => {
                    warn!(topic, "Producer queue full, backing off");
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err(e) => {
                    return Err(Error::Publish(format!("enqueue to {} failed: {}", topic, e)))
                }
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        self.blocking(move |producer| producer.flush(timeout))
            .await?
            .map_err(Error::Flush)
    }

    async fn init_transactions(&self, timeout: Duration) -> Result<()> {
        Ok(self
            .blocking(move |producer| producer.init_transactions(timeout))
            .await??)
    }

    async fn begin_transaction(&self) -> Result<()> {
        Ok(self.producer()?.begin_transaction()?)
    }

    async fn commit_transaction(&self, timeout: Duration) -> Result<()> {
        Ok(self
            .blocking(move |producer| producer.commit_transaction(timeout))
            .await??)
    }

    async fn abort_transaction(&self, timeout: Duration) -> Result<()> {
        Ok(self
            .blocking(move |producer| producer.abort_transaction(timeout))
            .await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_settings() {
        let config = KafkaConfig::default();
        let producer = KafkaProducer::new("acme-exporter", None, &config, DeliveryReports::new());
        let settings = producer.client_config();

        assert_eq!(settings.get("metadata.broker.list"), Some("localhost:9092"));
        assert_eq!(settings.get("client.id"), Some("acme-exporter"));
        assert_eq!(settings.get("compression.codec"), Some("lz4"));
        assert_eq!(settings.get("queue.buffering.max.messages"), Some("150000"));
        assert_eq!(settings.get("message.max.bytes"), Some("10485760"));
        assert_eq!(settings.get("transactional.id"), None);
        assert!(!producer.is_connected());
    }

    #[test]
    fn test_transactional_settings() {
        let config = KafkaConfig::default();
        let producer = KafkaProducer::new(
            "acme-exporter",
            Some("acme".to_string()),
            &config,
            DeliveryReports::new(),
        );
        let settings = producer.client_config();

        assert_eq!(settings.get("transactional.id"), Some("acme"));
        assert_eq!(settings.get("enable.idempotence"), Some("true"));
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let producer =
            KafkaProducer::new("acme-exporter", None, &KafkaConfig::default(), DeliveryReports::new());

        let result = producer
            .produce("acme", None, Bytes::from_static(b"{}"))
            .await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(matches!(
            producer.flush(Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires running Kafka
    async fn test_connect_and_flush() {
        let mut producer =
            KafkaProducer::new("acme-exporter", None, &KafkaConfig::default(), DeliveryReports::new());
        producer.connect().await.unwrap();
        producer
            .produce("acme", Some("1"), Bytes::from_static(b"{\"key\":1}"))
            .await
            .unwrap();
        producer.flush(Duration::from_secs(5)).await.unwrap();
        producer.disconnect().await.unwrap();
    }
}
