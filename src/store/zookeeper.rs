use super::{ancestors, CoordinationStore};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};
use zookeeper_client as zk;

/// [`CoordinationStore`] backed by a ZooKeeper ensemble.
///
/// The client session lives only between `connect` and `close`; each
/// exporter owns its own session.
pub struct ZooKeeperStore {
    url: String,
    connect_timeout: Duration,
    client: Option<zk::Client>,
}

impl ZooKeeperStore {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            client: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn client(&self) -> Result<&zk::Client> {
        self.client.as_ref().ok_or(Error::NotConnected)
    }

    fn create_options() -> zk::CreateOptions<'static> {
        zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all())
    }
}

#[async_trait]
impl CoordinationStore for ZooKeeperStore {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to zookeeper host {}", self.url);

        let client = tokio::time::timeout(self.connect_timeout, zk::Client::connect(&self.url))
            .await
            .map_err(|_| Error::Timeout {
                message: format!(
                    "connecting to zookeeper at {} took longer than {:?}",
                    self.url, self.connect_timeout
                ),
            })?
            .map_err(|e| Error::Connection(format!("zookeeper at {}: {}", self.url, e)))?;

        self.client = Some(client);
        info!("Connected to zookeeper host {}", self.url);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            info!("Disconnected from zookeeper host {}", self.url);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let stat = self.client()?.check_stat(path).await?;
        Ok(stat.is_some())
    }

    async fn get_data(&self, path: &str) -> Result<Bytes> {
        let (data, _stat) = self.client()?.get_data(path).await?;
        Ok(Bytes::from(data))
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> Result<()> {
        self.client()?.set_data(path, data, None).await?;
        Ok(())
    }

    async fn mkdirp(&self, path: &str, data: &[u8]) -> Result<()> {
        let client = self.client()?;
        let options = Self::create_options();

        for parent in ancestors(path) {
            match client.create(parent, &[], &options).await {
                Ok(_) => debug!("Created zookeeper node {}", parent),
                Err(zk::Error::NodeExists) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match client.create(path, data, &options).await {
            Ok(_) => {
                debug!("Created zookeeper node {}", path);
                Ok(())
            }
            Err(zk::Error::NodeExists) => {
                client.set_data(path, data, None).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
