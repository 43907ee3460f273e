use super::error::{Result, ShardError};
use super::types::{
    CommitPolicy, ConsistencyMode, Durability, NodeRole, NodeStatus, Region, ReplicationLane,
    ShardQuota, Tier,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A customer account owning one or more fleets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub sla_tier: Tier,
    #[serde(default)]
    pub dedicated_routers: bool,
    #[serde(default)]
    pub dedicated_shards: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_ref: Option<String>,
}

/// A workload group whose data lives on exactly one shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Fleet {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub preferred_regions: Vec<Region>,
    pub consistency: ConsistencyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShardNode {
    pub id: String,
    pub region: Region,
    pub availability_zone: String,
    pub role: NodeRole,
    pub status: NodeStatus,
}

impl ShardNode {
    pub fn new(
        id: impl Into<String>,
        region: Region,
        availability_zone: impl Into<String>,
        role: NodeRole,
    ) -> Self {
        Self {
            id: id.into(),
            region,
            availability_zone: availability_zone.into(),
            role,
            status: NodeStatus::Healthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == NodeStatus::Healthy
    }
}

/// Failover lifecycle of a shard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShardState {
    #[default]
    Healthy,
    Degraded,
    Promoting,
    Verifying,
}

impl ShardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardState::Healthy => "healthy",
            ShardState::Degraded => "degraded",
            ShardState::Promoting => "promoting",
            ShardState::Verifying => "verifying",
        }
    }

    pub fn is_mid_failover(&self) -> bool {
        *self != ShardState::Healthy
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight failover bookkeeping stored alongside the shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailoverProgress {
    pub target_region: Region,
    pub candidate_node_id: String,
    pub previous_primary_id: String,
    pub started_at: DateTime<Utc>,
}

/// The authoritative record for one shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShardMapEntry {
    pub shard_id: String,
    pub fleets: Vec<String>,
    pub nodes: Vec<ShardNode>,
    pub replication_lane: ReplicationLane,
    pub consistency_tier: Tier,
    pub durability_tier: Durability,
    pub commit_policy: CommitPolicy,
    pub availability_zones: Vec<String>,
    pub quota: ShardQuota,
    #[serde(default)]
    pub state: ShardState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverProgress>,
}

impl ShardMapEntry {
    pub fn serves_fleet(&self, fleet_id: &str) -> bool {
        self.fleets.iter().any(|fleet| fleet == fleet_id)
    }

    pub fn primary(&self) -> Option<&ShardNode> {
        self.nodes.iter().find(|node| node.role == NodeRole::Primary)
    }

    pub fn primary_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.role == NodeRole::Primary)
            .count()
    }

    pub fn node(&self, node_id: &str) -> Option<&ShardNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut ShardNode> {
        self.nodes.iter_mut().find(|node| node.id == node_id)
    }

    /// Checks the structural invariants every stored entry must satisfy.
    ///
    /// - non-empty shard id and at least one node,
    /// - unique node ids,
    /// - exactly one primary,
    /// - platinum durability implies global quorum,
    /// - bronze tier implies archive-only replication.
    pub fn validate(&self) -> Result<()> {
        if self.shard_id.trim().is_empty() {
            return Err(ShardError::Validation(
                "shard_id must not be empty".to_string(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(ShardError::Validation(format!(
                "Shard '{}' must have at least one node",
                self.shard_id
            )));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ShardError::Validation(format!(
                    "Node id on shard '{}' must not be empty",
                    self.shard_id
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ShardError::Validation(format!(
                    "Node '{}' appears more than once on shard '{}'",
                    node.id, self.shard_id
                )));
            }
        }

        let primaries = self.primary_count();
        if primaries != 1 {
            return Err(ShardError::Conflict(format!(
                "Shard '{}' has {} primaries, expected exactly 1",
                self.shard_id, primaries
            )));
        }

        if self.durability_tier == Durability::Platinum
            && self.commit_policy != CommitPolicy::GlobalQuorum
        {
            return Err(ShardError::Validation(format!(
                "Shard '{}' is platinum but commit policy is {}",
                self.shard_id, self.commit_policy
            )));
        }
        if self.consistency_tier == Tier::Bronze
            && self.replication_lane != ReplicationLane::ArchiveOnly
        {
            return Err(ShardError::Validation(format!(
                "Shard '{}' is bronze but replication lane is {}",
                self.shard_id, self.replication_lane
            )));
        }

        Ok(())
    }
}
