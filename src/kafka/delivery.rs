//! Delivery report observers.
//!
//! librdkafka reports the outcome of every enqueued message asynchronously.
//! Failures are turned into a [`DeliveryFailure`] and handed to the single
//! active handler. Without a subscribed handler a failure is fatal.

use crate::fatal;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::error;

/// A message the broker did not accept after it was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery to {topic} [{partition}] failed: {reason}")]
pub struct DeliveryFailure {
    pub topic: String,
    pub partition: i32,
    pub key: Option<String>,
    pub reason: String,
}

pub type DeliveryHandler = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

/// Shared slot for the active delivery-failure handler.
///
/// Clones observe the same slot, so the producer's client context and the
/// exporter can both hold one.
#[derive(Clone, Default)]
pub struct DeliveryReports {
    handler: Arc<RwLock<Option<DeliveryHandler>>>,
}

impl DeliveryReports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active handler (the fatal default included).
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&DeliveryFailure) + Send + Sync + 'static,
    {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Restores the fatal default.
    pub fn unsubscribe(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_subscriber(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Dispatches a failure to the active handler, or terminates the process.
    pub fn report(&self, failure: DeliveryFailure) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(&failure),
            None => {
                error!(
                    topic = %failure.topic,
                    partition = failure.partition,
                    key = ?failure.key,
                    "Undelivered message with no delivery handler subscribed"
                );
                fatal::terminate(&failure.to_string())
            }
        }
    }
}

impl std::fmt::Debug for DeliveryReports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryReports")
            .field("has_subscriber", &self.has_subscriber())
            .finish()
    }
}
