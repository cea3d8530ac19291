//! The resumable exporter.
//!
//! An [`Exporter`] owns one coordination-store session and one producer
//! session. A typical cycle reads the last position, publishes the next
//! batch and only then saves the new position, so the stored position
//! never runs ahead of data the broker acknowledged. A crash between send
//! and save re-delivers the last batch on restart; keys derived with
//! [`next_key`](crate::position::next_key) let consumers drop those
//! duplicates.
//!
//! # Example
//!
//! ```rust,no_run
//! use resumable_exporter::{position::next_key, Config, Exporter, Position};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> resumable_exporter::Result<()> {
//!     let config = Config::from_env()?;
//!     let mut exporter = Exporter::new("acme-exporter", &config)?;
//!     exporter.connect().await?;
//!
//!     let last = exporter.get_last_position().await?;
//!     let key = next_key(last.as_ref());
//!     let event = json!({"timestamp": 1000, "key": key});
//!
//!     exporter
//!         .export(event, Some("key"), Position::from(json!({"timestamp": 1000, "key": key})))
//!         .await?;
//!
//!     exporter.disconnect().await
//! }
//! ```

use crate::checkpoint::PositionStore;
use crate::identity::ExporterIdentity;
use crate::metrics::ExporterMetrics;
use crate::kafka::{
    Batch, BrokerProducer, DeliveryFailure, DeliveryReports, KafkaProducer, Publisher,
    TransactionController, TransactionState,
};
use crate::position::Position;
use crate::store::{CoordinationStore, ZooKeeperStore};
use crate::{Config, Error, Result};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Streams records to one topic and checkpoints progress for one exporter.
pub struct Exporter<S = ZooKeeperStore, P = KafkaProducer> {
    identity: ExporterIdentity,
    store: S,
    producer: P,
    positions: PositionStore,
    publisher: Publisher,
    transactions: TransactionController,
    reports: DeliveryReports,
    metrics: ExporterMetrics,
    connected: bool,
}

impl Exporter<ZooKeeperStore, KafkaProducer> {
    /// Builds an exporter talking to ZooKeeper and Kafka as configured.
    ///
    /// Nothing is contacted until [`connect`](Exporter::connect).
    pub fn new(name: impl Into<String>, config: &Config) -> Result<Self> {
        let identity = ExporterIdentity::new(name).with_topic(config.kafka.topic.clone());
        let reports = DeliveryReports::new();

        let transactional_id = config
            .kafka
            .transactional
            .then(|| identity.transactional_id());
        let producer = KafkaProducer::new(
            identity.name(),
            transactional_id,
            &config.kafka,
            reports.clone(),
        );
        let store = ZooKeeperStore::new(&config.zookeeper.url, config.zookeeper.connect_timeout());

        Self::with_clients(identity, config, store, producer, reports)
    }
}

impl<S, P> Exporter<S, P>
where
    S: CoordinationStore,
    P: BrokerProducer,
{
    /// Builds an exporter over caller-supplied clients.
    ///
    /// `reports` must be the handle the producer forwards delivery
    /// failures to.
    pub fn with_clients(
        identity: ExporterIdentity,
        config: &Config,
        store: S,
        producer: P,
        reports: DeliveryReports,
    ) -> Result<Self> {
        let positions = PositionStore::new(identity.position_node());
        let publisher = Publisher::new(identity.topic_name(), &config.kafka);
        let transactions = TransactionController::new(
            config.kafka.transactional,
            config.kafka.transaction_timeout(),
        );
        let metrics = ExporterMetrics::new(identity.name())?;

        Ok(Self {
            identity,
            store,
            producer,
            positions,
            publisher,
            transactions,
            reports,
            metrics,
            connected: false,
        })
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn topic_name(&self) -> &str {
        self.publisher.topic()
    }

    pub fn position_node(&self) -> &str {
        self.positions.node_path()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Connects the coordination store, then the producer.
    ///
    /// Completes once the producer reports it is ready. Either failure is
    /// returned as-is and leaves the exporter disconnected.
    #[instrument(skip(self), fields(exporter = %self.identity.name()))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            debug!("Exporter already connected");
            return Ok(());
        }

        self.store.connect().await?;

        if let Err(e) = self.producer.connect().await {
            error!("Failed to connect producer: {}", e);
            if let Err(close_err) = self.store.close().await {
                warn!("Failed to close coordination store session: {}", close_err);
            }
            return Err(e);
        }

        self.connected = true;
        self.metrics.record_restart();
        info!(
            topic = %self.publisher.topic(),
            node = %self.positions.node_path(),
            "Exporter connected"
        );
        Ok(())
    }

    /// Closes the store session and disconnects the producer if it is connected.
    ///
    /// The exporter counts as disconnected afterwards even when the producer
    /// fails to shut down cleanly.
    #[instrument(skip(self), fields(exporter = %self.identity.name()))]
    pub async fn disconnect(&mut self) -> Result<()> {
        let closed = self.store.close().await;
        self.connected = false;

        if self.producer.is_connected() {
            self.producer.disconnect().await?;
        }

        closed
    }

    /// Last saved position, or `None` on a cold start or unreadable checkpoint.
    pub async fn get_last_position(&self) -> Result<Option<Position>> {
        self.ensure_connected()?;
        self.positions.get_last_position(&self.store).await
    }

    /// Persists `position`; `None` is a no-op.
    ///
    /// Call this only after the data the position covers was acknowledged.
    pub async fn save_position(&self, position: Option<&Position>) -> Result<()> {
        self.ensure_connected()?;
        self.positions.save_position(&self.store, position).await?;
        if let Some(position) = position {
            self.metrics.record_position(position);
        }
        Ok(())
    }

    pub async fn send_data(&self, batch: impl Into<Batch>) -> Result<()> {
        self.ensure_connected()?;
        self.publish(&batch.into(), None).await
    }

    pub async fn send_data_with_key(&self, batch: impl Into<Batch>, key_field: &str) -> Result<()> {
        self.ensure_connected()?;
        self.publish(&batch.into(), Some(key_field)).await
    }

    /// Sends a large batch in chunks of `kafka.max_events_per_request`.
    pub async fn send_data_chunked(
        &self,
        batch: impl Into<Batch>,
        key_field: Option<&str>,
    ) -> Result<()> {
        self.ensure_connected()?;
        let batch = batch.into();
        let started = Instant::now();
        let result = self
            .publisher
            .send_data_chunked(&self.producer, &batch, key_field)
            .await;
        self.metrics
            .record_request(batch.len(), started.elapsed(), result.is_ok());
        result
    }

    pub async fn init_transactions(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.transactions.init_transactions(&self.producer).await
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.transactions.begin_transaction(&self.producer).await
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.transactions.commit_transaction(&self.producer).await
    }

    pub async fn abort_transaction(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.transactions.abort_transaction(&self.producer).await
    }

    /// Replaces the fatal default for delivery failures with `handler`.
    pub fn subscribe_delivery_reports<F>(&self, handler: F)
    where
        F: Fn(&DeliveryFailure) + Send + Sync + 'static,
    {
        self.reports.subscribe(handler);
    }

    /// Restores the fatal default for delivery failures.
    pub fn unsubscribe_delivery_reports(&self) {
        self.reports.unsubscribe();
    }

    /// Publishes `batch` and then saves `position`.
    ///
    /// In transactional mode the batch is wrapped in its own transaction,
    /// which is aborted if sending or committing fails. The position is
    /// saved only after the send (and commit) succeeded. If that save
    /// fails, [`Error::PositionNotSaved`] carries the position so the
    /// caller can retry [`save_position`](Exporter::save_position) without
    /// re-sending.
    #[instrument(skip_all, fields(exporter = %self.identity.name()))]
    pub async fn export(
        &mut self,
        batch: impl Into<Batch>,
        key_field: Option<&str>,
        position: Position,
    ) -> Result<()> {
        self.ensure_connected()?;
        let batch = batch.into();

        if self.transactions.is_enabled() {
            self.transactions.begin_transaction(&self.producer).await?;

            if let Err(e) = self.publish(&batch, key_field).await {
                self.abort_after_failure(&e).await;
                return Err(e);
            }
            if let Err(e) = self.transactions.commit_transaction(&self.producer).await {
                self.abort_after_failure(&e).await;
                return Err(e);
            }
        } else {
            self.publish(&batch, key_field).await?;
        }

        if let Err(e) = self.positions.save_position(&self.store, Some(&position)).await {
            error!(position = %position, "Batch acknowledged but position not saved: {}", e);
            return Err(Error::PositionNotSaved {
                position,
                source: Box::new(e),
            });
        }
        self.metrics.record_position(&position);

        debug!(records = batch.len(), position = %position, "Export cycle complete");
        Ok(())
    }

    async fn publish(&self, batch: &Batch, key_field: Option<&str>) -> Result<()> {
        let started = Instant::now();
        let result = match key_field {
            Some(field) => {
                self.publisher
                    .send_data_with_key(&self.producer, batch, field)
                    .await
            }
            None => self.publisher.send_data(&self.producer, batch).await,
        };
        self.metrics
            .record_request(batch.len(), started.elapsed(), result.is_ok());
        result
    }

    async fn abort_after_failure(&mut self, cause: &Error) {
        warn!("Aborting transaction after failure: {}", cause);
        if let Err(e) = self.transactions.abort_transaction(&self.producer).await {
            error!("Failed to abort transaction: {}", e);
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}
