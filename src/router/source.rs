use crate::core::{Result, ShardError, ShardMapEntry};
use crate::topology::TopologyStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Where a router fetches the authoritative shard map from.
#[async_trait]
pub trait ShardMapSource: Send + Sync {
    async fn fetch_shard_map(&self) -> Result<Vec<ShardMapEntry>>;
}

/// Reads the shard map straight from an in-process topology store.
pub struct TopologySource {
    topology: Arc<TopologyStore>,
}

impl TopologySource {
    pub fn new(topology: Arc<TopologyStore>) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl ShardMapSource for TopologySource {
    async fn fetch_shard_map(&self) -> Result<Vec<ShardMapEntry>> {
        self.topology.get_all().await
    }
}

/// Fetches `GET <base>/shard-map` from a remote control plane.
pub struct HttpShardMapSource {
    client: reqwest::Client,
    url: String,
}

impl HttpShardMapSource {
    pub fn new(control_plane_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), control_plane_url)
    }

    pub fn with_client(client: reqwest::Client, control_plane_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/shard-map", control_plane_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ShardMapSource for HttpShardMapSource {
    async fn fetch_shard_map(&self) -> Result<Vec<ShardMapEntry>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| ShardError::UpstreamUnavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ShardError::UpstreamUnavailable(format!(
                "control-plane status {}",
                response.status()
            )));
        }
        response
            .json::<Vec<ShardMapEntry>>()
            .await
            .map_err(|err| ShardError::UpstreamUnavailable(format!("invalid shard map: {err}")))
    }
}
