#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use resumable_exporter::kafka::{BrokerProducer, DeliveryReports};
use resumable_exporter::store::MemoryStore;
use resumable_exporter::{Config, Error, Exporter, ExporterIdentity, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ProducerLog {
    /// Enqueued but not yet flushed
    pub pending: Vec<Sent>,
    /// Confirmed by a successful flush
    pub acknowledged: Vec<Sent>,
    pub calls: Vec<&'static str>,
}

/// Producer double; clones share the same log and failure switches.
#[derive(Clone, Default)]
pub struct MockProducer {
    log: Arc<Mutex<ProducerLog>>,
    fail_connect: Arc<AtomicBool>,
    fail_flush: Arc<AtomicBool>,
    fail_disconnect: Arc<AtomicBool>,
    connected: bool,
}

impl MockProducer {
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn acknowledged(&self) -> Vec<Sent> {
        self.log.lock().unwrap().acknowledged.clone()
    }

    pub fn produced_count(&self) -> usize {
        let log = self.log.lock().unwrap();
        log.pending.len() + log.acknowledged.len()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().calls.clone()
    }

    fn call(&self, name: &'static str) {
        self.log.lock().unwrap().calls.push(name);
    }
}

#[async_trait]
impl BrokerProducer for MockProducer {
    async fn connect(&mut self) -> Result<()> {
        self.call("connect");
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Connection("broker refused connection".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.call("disconnect");
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::Flush(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)));
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn produce(&self, topic: &str, key: Option<&str>, payload: Bytes) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("produce");
        log.pending.push(Sent {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("flush");
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Error::Flush(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)));
        }
        let pending = std::mem::take(&mut log.pending);
        log.acknowledged.extend(pending);
        Ok(())
    }

    async fn init_transactions(&self, _timeout: Duration) -> Result<()> {
        self.call("init");
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.call("begin");
        Ok(())
    }

    async fn commit_transaction(&self, _timeout: Duration) -> Result<()> {
        self.call("commit");
        Ok(())
    }

    async fn abort_transaction(&self, _timeout: Duration) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("abort");
        log.pending.clear();
        Ok(())
    }
}

pub struct Harness {
    pub exporter: Exporter<MemoryStore, MockProducer>,
    pub store: MemoryStore,
    pub producer: MockProducer,
    pub reports: DeliveryReports,
}

/// Exporter over in-memory clients; `store` and `producer` observe it.
pub fn harness(name: &str, config: &Config) -> Harness {
    harness_with_store(name, config, MemoryStore::new())
}

pub fn harness_with_store(name: &str, config: &Config, store: MemoryStore) -> Harness {
    let producer = MockProducer::default();
    let reports = DeliveryReports::new();
    let identity = ExporterIdentity::new(name).with_topic(config.kafka.topic.clone());
    let exporter = Exporter::with_clients(
        identity,
        config,
        store.clone(),
        producer.clone(),
        reports.clone(),
    )
    .unwrap();

    Harness {
        exporter,
        store,
        producer,
        reports,
    }
}

pub fn transactional_config() -> Config {
    let mut config = Config::default();
    config.kafka.transactional = true;
    config
}
