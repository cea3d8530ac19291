use super::{ancestors, CoordinationStore};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use zookeeper_client as zk;

#[derive(Debug, Default)]
struct Shared {
    nodes: Mutex<BTreeMap<String, Bytes>>,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

/// In-process [`CoordinationStore`] with ZooKeeper node semantics.
///
/// Clones share the same node tree, so a test can keep a handle after
/// moving the store into an exporter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    connected: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a node, e.g. a checkpoint written by an older exporter.
    pub fn with_node(self, path: &str, data: impl Into<Bytes>) -> Self {
        self.nodes().insert(path.to_string(), data.into());
        self
    }

    pub fn node(&self, path: &str) -> Option<Bytes> {
        self.nodes().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.nodes().keys().cloned().collect()
    }

    /// Number of nodes created through `mkdirp`, ancestors included.
    pub fn create_count(&self) -> usize {
        self.shared.creates.load(Ordering::SeqCst)
    }

    /// Number of in-place payload updates.
    pub fn update_count(&self) -> usize {
        self.shared.updates.load(Ordering::SeqCst)
    }

    /// Makes the next `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes `set_data` and `mkdirp` fail with a connection loss.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.shared.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_connected()?;
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(zk::Error::ConnectionLoss.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn connect(&mut self) -> Result<()> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Connection("memory store refused connection".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.nodes().contains_key(path))
    }

    async fn get_data(&self, path: &str) -> Result<Bytes> {
        self.ensure_connected()?;
        self.nodes()
            .get(path)
            .cloned()
            .ok_or_else(|| zk::Error::NoNode.into())
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let mut nodes = self.nodes();
        match nodes.get_mut(path) {
            Some(payload) => {
                *payload = Bytes::copy_from_slice(data);
                self.shared.updates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(zk::Error::NoNode.into()),
        }
    }

    async fn mkdirp(&self, path: &str, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let mut nodes = self.nodes();

        for parent in ancestors(path) {
            if !nodes.contains_key(parent) {
                nodes.insert(parent.to_string(), Bytes::new());
                self.shared.creates.fetch_add(1, Ordering::SeqCst);
                debug!("Created memory node {}", parent);
            }
        }

        if nodes
            .insert(path.to_string(), Bytes::copy_from_slice(data))
            .is_some()
        {
            self.shared.updates.fetch_add(1, Ordering::SeqCst);
        } else {
            self.shared.creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
