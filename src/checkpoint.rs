//! Checkpoint persistence for resumable exports.
//!
//! This module stores the last exported [`Position`] in the coordination
//! store so that a restarted exporter resumes where it left off instead of
//! re-scanning or dropping data.
//!
//! # Example
//!
//! ```rust
//! use resumable_exporter::checkpoint::PositionStore;
//! use resumable_exporter::store::{CoordinationStore, MemoryStore};
//! use resumable_exporter::position::Position;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = MemoryStore::new();
//!     store.connect().await?;
//!     let positions = PositionStore::new("/acme-exporter/acme/block-number");
//!
//!     // Cold start
//!     assert!(positions.get_last_position(&store).await?.is_none());
//!
//!     let position = Position::Structured(json!({"timestamp": 1000, "key": 1}));
//!     positions.save_position(&store, Some(&position)).await?;
//!     assert_eq!(positions.get_last_position(&store).await?, Some(position));
//!
//!     Ok(())
//! }
//! ```

use crate::position::{self, Position};
use crate::store::CoordinationStore;
use crate::Result;
use tracing::{debug, error, info};

/// Reads and writes the checkpoint node of one exporter/topic pair.
///
/// The store session is passed in per call; the position store only knows
/// the node path. Positions are always written in the versioned format,
/// while legacy payloads are still understood on read.
#[derive(Debug, Clone)]
pub struct PositionStore {
    node_path: String,
}

impl PositionStore {
    /// Creates a position store for the given checkpoint node.
    ///
    /// # Example
    ///
    /// ```rust
    /// use resumable_exporter::checkpoint::PositionStore;
    ///
    /// let positions = PositionStore::new("/acme-exporter/acme/block-number");
    /// assert_eq!(positions.node_path(), "/acme-exporter/acme/block-number");
    /// ```
    pub fn new(node_path: impl Into<String>) -> Self {
        Self {
            node_path: node_path.into(),
        }
    }

    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    /// Loads the last saved position.
    ///
    /// Returns `None` when the node does not exist, which is the normal
    /// state of a fresh exporter. A payload that cannot be decoded is
    /// logged and also reported as `None`, so the exporter starts over
    /// rather than crashing on a corrupt checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if the coordination store itself fails.
    pub async fn get_last_position<S>(&self, store: &S) -> Result<Option<Position>>
    where
        S: CoordinationStore + ?Sized,
    {
        if !store.exists(&self.node_path).await? {
            debug!("No checkpoint node at {}", self.node_path);
            return Ok(None);
        }

        let payload = store.get_data(&self.node_path).await?;

        match position::decode(&payload) {
            Ok(Some(position)) => {
                info!(node = %self.node_path, position = %position, "Loaded checkpoint");
                Ok(Some(position))
            }
            Ok(None) => {
                debug!("Checkpoint node {} has an empty payload", self.node_path);
                Ok(None)
            }
            Err(e) => {
                error!(
                    node = %self.node_path,
                    payload_len = payload.len(),
                    "Failed to decode checkpoint, starting without a position: {}",
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persists `position`, creating the node on first use.
    ///
    /// `None` is a no-op. An existing node is updated in place; otherwise
    /// the node and any missing ancestors are created.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the position cannot be encoded or the store write
    /// fails.
    pub async fn save_position<S>(&self, store: &S, position: Option<&Position>) -> Result<()>
    where
        S: CoordinationStore + ?Sized,
    {
        let Some(position) = position else {
            return Ok(());
        };

        let payload = position::encode(position)?;
        debug!(node = %self.node_path, position = %position, "Saving checkpoint");

        if store.exists(&self.node_path).await? {
            store.set_data(&self.node_path, &payload).await?;
        } else {
            info!("Creating checkpoint node {}", self.node_path);
            store.mkdirp(&self.node_path, &payload).await?;
        }

        debug!("Checkpoint saved successfully");
        Ok(())
    }
}
