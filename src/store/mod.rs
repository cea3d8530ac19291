//! Coordination store access for checkpoint nodes.
//!
//! The exporter only needs a handful of primitives from the hierarchical
//! store: an existence check, read, in-place update and a "make path"
//! create. [`ZooKeeperStore`] talks to a real ensemble; [`MemoryStore`]
//! keeps nodes in process and is what the test suite runs against.

mod memory;
mod zookeeper;

pub use memory::MemoryStore;
pub use zookeeper::ZooKeeperStore;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Primitives the position store consumes from a ZooKeeper-like service.
///
/// The session is opened by [`connect`](CoordinationStore::connect) and
/// released by [`close`](CoordinationStore::close); node operations outside
/// an open session fail with [`Error::NotConnected`](crate::Error::NotConnected).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn connect(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn get_data(&self, path: &str) -> Result<Bytes>;

    /// Overwrites the payload of an existing node.
    async fn set_data(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Creates `path` with `data`, creating missing ancestors with empty
    /// payloads. Writes the payload in place if `path` appeared meanwhile.
    async fn mkdirp(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// Proper ancestors of an absolute node path, outermost first.
pub(crate) fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/')
        .map(|(idx, _)| idx)
        .filter(|&idx| idx > 0)
        .map(|idx| &path[..idx])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestors() {
        assert_eq!(
            ancestors("/acme-exporter/acme/block-number"),
            vec!["/acme-exporter", "/acme-exporter/acme"]
        );
        assert!(ancestors("/root").is_empty());
    }
}
