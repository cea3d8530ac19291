use super::BrokerProducer;
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Uninitialized,
    /// Transactions initialized, none open.
    Ready,
    Open,
}

/// Enforces the producer transaction protocol
/// (`init` once, then `begin` → `commit` | `abort`, repeated).
///
/// Out-of-order calls fail with [`Error::TransactionProtocol`] before the
/// broker client is touched.
#[derive(Debug, Clone)]
pub struct TransactionController {
    enabled: bool,
    timeout: Duration,
    state: TransactionState,
}

impl TransactionController {
    pub fn new(enabled: bool, timeout: Duration) -> Self {
        Self {
            enabled,
            timeout,
            state: TransactionState::Uninitialized,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    pub async fn init_transactions<P>(&mut self, producer: &P) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        if !self.enabled {
            return Err(protocol(
                "init_transactions requires an exporter created in transactional mode",
            ));
        }
        if self.state != TransactionState::Uninitialized {
            return Err(protocol("init_transactions may only be called once"));
        }

        producer.init_transactions(self.timeout).await?;
        self.state = TransactionState::Ready;
        info!("Kafka transactions initialized");
        Ok(())
    }

    pub async fn begin_transaction<P>(&mut self, producer: &P) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        match self.state {
            TransactionState::Uninitialized => {
                return Err(protocol("begin_transaction called before init_transactions"))
            }
            TransactionState::Open => return Err(protocol("a transaction is already open")),
            TransactionState::Ready => {}
        }

        producer.begin_transaction().await?;
        self.state = TransactionState::Open;
        debug!("Transaction opened");
        Ok(())
    }

    /// Commits the open transaction. On failure it stays open so the caller
    /// can abort it.
    pub async fn commit_transaction<P>(&mut self, producer: &P) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        self.require_open("commit_transaction")?;

        producer.commit_transaction(self.timeout).await?;
        self.state = TransactionState::Ready;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn abort_transaction<P>(&mut self, producer: &P) -> Result<()>
    where
        P: BrokerProducer + ?Sized,
    {
        self.require_open("abort_transaction")?;

        producer.abort_transaction(self.timeout).await?;
        self.state = TransactionState::Ready;
        warn!("Transaction aborted");
        Ok(())
    }

    fn require_open(&self, operation: &str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(protocol(format!("{} called without an open transaction", operation)))
        }
    }
}

fn protocol(message: impl Into<String>) -> Error {
    Error::TransactionProtocol(message.into())
}
