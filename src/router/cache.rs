use super::select::select_node;
use super::source::ShardMapSource;
use crate::config::RouterConfig;
use crate::core::{
    ConsistencyMode, NodeRole, Operation, Region, ReplicationLane, Result, ShardError,
    ShardMapEntry, Tier,
};
use crate::events::Event;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::timeout;
use tracing::{Level, event};
use uuid::Uuid;

/// One request to route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub tenant_id: String,
    pub fleet_id: String,
    pub op: Operation,
    #[serde(default = "default_consistency")]
    pub consistency: ConsistencyMode,
    #[serde(default)]
    pub region_hint: Option<Region>,
    #[serde(default)]
    pub request_id: Option<String>,
}

fn default_consistency() -> ConsistencyMode {
    ConsistencyMode::Bounded
}

impl RouteRequest {
    pub fn new(tenant_id: impl Into<String>, fleet_id: impl Into<String>, op: Operation) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            fleet_id: fleet_id.into(),
            op,
            consistency: default_consistency(),
            region_hint: None,
            request_id: None,
        }
    }

    pub fn consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn region_hint(mut self, region: Region) -> Self {
        self.region_hint = Some(region);
        self
    }
}

/// Node chosen for a request, with the cache age it was decided on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub shard_id: String,
    pub target_node_id: String,
    pub region: Region,
    pub role: NodeRole,
    pub cache_age_ms: u64,
    pub cache_stale: bool,
    pub consistency_tier: Tier,
    pub replication_lane: ReplicationLane,
    pub request_id: String,
}

/// Snapshot of the cached shard map handed to a single request.
#[derive(Debug, Clone)]
pub struct CacheView {
    pub entries: Arc<Vec<ShardMapEntry>>,
    pub age: Duration,
    /// True when served from an expired cache after a failed refresh.
    pub stale: bool,
}

struct CachedShardMap {
    entries: Arc<Vec<ShardMapEntry>>,
    fetched_at: Instant,
    invalidated: bool,
}

impl CachedShardMap {
    fn view(&self, stale: bool) -> CacheView {
        CacheView {
            entries: self.entries.clone(),
            age: self.fetched_at.elapsed(),
            stale,
        }
    }
}

#[derive(Default)]
struct CacheState {
    map: Option<CachedShardMap>,
    /// When the most recent fetch failed. Cleared by a successful fetch.
    last_failure: Option<Instant>,
}

/// TTL-bounded, stale-tolerant client-side copy of the shard map.
///
/// At most one fetch is in flight. While it runs, or for one TTL after it
/// fails, requests are answered from the last good copy without waiting.
pub struct RouterCache {
    source: Arc<dyn ShardMapSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl RouterCache {
    pub fn new(source: Arc<dyn ShardMapSource>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(source: Arc<dyn ShardMapSource>, config: &RouterConfig) -> Self {
        Self::new(source, config.cache_ttl, config.fetch_timeout)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Age of the cached map, or `None` before the first successful fetch.
    pub async fn cache_age(&self) -> Option<Duration> {
        self.state
            .read()
            .await
            .map
            .as_ref()
            .map(|cached| cached.fetched_at.elapsed())
    }

    /// Forces the next lookup to refetch. The current copy stays as fallback.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.last_failure = None;
        if let Some(cached) = state.map.as_mut() {
            cached.invalidated = true;
        }
    }

    async fn fresh_view(&self) -> Option<CacheView> {
        let state = self.state.read().await;
        state
            .map
            .as_ref()
            .filter(|cached| !cached.invalidated && cached.fetched_at.elapsed() <= self.ttl)
            .map(|cached| cached.view(false))
    }

    async fn stale_view(&self) -> Option<CacheView> {
        self.state
            .read()
            .await
            .map
            .as_ref()
            .map(|cached| cached.view(true))
    }

    /// Last good copy, while a recent failed fetch is still backing off.
    async fn backoff_view(&self) -> Option<CacheView> {
        let state = self.state.read().await;
        let backing_off = state
            .last_failure
            .is_some_and(|failed_at| failed_at.elapsed() < self.ttl);
        if !backing_off {
            return None;
        }
        state.map.as_ref().map(|cached| cached.view(true))
    }

    /// Returns the shard map, refetching when absent, expired or invalidated.
    ///
    /// A failed or timed out fetch falls back to the last good copy. Without
    /// one the failure surfaces as `UpstreamUnavailable`. Requests never queue
    /// behind an in-flight fetch when a copy exists, so no request waits
    /// longer than one `fetch_timeout`.
    pub async fn shard_map(&self) -> Result<CacheView> {
        let requested_at = Instant::now();
        if let Some(view) = self.fresh_view().await {
            return Ok(view);
        }
        if let Some(view) = self.backoff_view().await {
            return Ok(view);
        }

        let _refresh = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(view) = self.stale_view().await {
                    event!(Level::DEBUG, "refresh in flight, serving cached copy");
                    return Ok(view);
                }
                // Cold cache: nothing to serve until the in-flight fetch lands.
                self.refresh_lock.lock().await
            }
        };

        // Another request may have refreshed while we waited.
        if let Some(view) = self.fresh_view().await {
            return Ok(view);
        }
        {
            let state = self.state.read().await;
            if state
                .last_failure
                .is_some_and(|failed_at| failed_at >= requested_at)
            {
                return match state.map.as_ref() {
                    Some(cached) => Ok(cached.view(true)),
                    None => Err(ShardError::UpstreamUnavailable(
                        "shard map fetch failed".to_string(),
                    )),
                };
            }
        }

        let fetched = match timeout(self.fetch_timeout, self.source.fetch_shard_map()).await {
            Ok(result) => result,
            Err(_) => Err(ShardError::UpstreamUnavailable(format!(
                "shard map fetch timed out after {}ms",
                self.fetch_timeout.as_millis()
            ))),
        };

        let mut state = self.state.write().await;
        match fetched {
            Ok(entries) => {
                let cached = CachedShardMap {
                    entries: Arc::new(entries),
                    fetched_at: Instant::now(),
                    invalidated: false,
                };
                let view = cached.view(false);
                state.map = Some(cached);
                state.last_failure = None;
                event!(Level::DEBUG, shards = view.entries.len(), "shard map refreshed");
                Ok(view)
            }
            Err(err) => {
                state.last_failure = Some(Instant::now());
                match state.map.as_ref() {
                    Some(cached) => {
                        event!(
                            Level::WARN,
                            error = %err,
                            age_ms = cached.fetched_at.elapsed().as_millis() as u64,
                            "shard map refresh failed, serving stale copy"
                        );
                        Ok(cached.view(true))
                    }
                    None => Err(match err {
                        ShardError::UpstreamUnavailable(_) => err,
                        other => ShardError::UpstreamUnavailable(other.to_string()),
                    }),
                }
            }
        }
    }

    /// Resolves the fleet's shard and picks the target node.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteDecision> {
        let view = self.shard_map().await?;
        let shard = view
            .entries
            .iter()
            .find(|entry| entry.serves_fleet(&request.fleet_id))
            .ok_or_else(|| ShardError::FleetNotFound(request.fleet_id.clone()))?;
        let node = select_node(shard, request.op, request.consistency, request.region_hint)
            .ok_or_else(|| {
                ShardError::Conflict(format!("Shard '{}' has no nodes", shard.shard_id))
            })?;

        Ok(RouteDecision {
            shard_id: shard.shard_id.clone(),
            target_node_id: node.id.clone(),
            region: node.region,
            role: node.role,
            cache_age_ms: view.age.as_millis() as u64,
            cache_stale: view.stale,
            consistency_tier: shard.consistency_tier,
            replication_lane: shard.replication_lane,
            request_id: request
                .request_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("req-{}", Uuid::new_v4())),
        })
    }

    /// Invalidates the cache whenever a topology-changing event arrives.
    pub fn watch_events(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<Event>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(record) if record.kind.changes_topology() => self.invalidate().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => self.invalidate().await,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
