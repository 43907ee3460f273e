//! Failover planning and the per-shard failover state machine.
//!
//! `plan_failover` is a pure plan generator: it returns the canonical five
//! steps and records a `failover.planned` event. The data plane then drives the
//! plan through `advance`, one command per step:
//!
//! ```text
//!   healthy --declare--> degraded --promote--> promoting --update-map--> verifying
//!      ^                    ^                                                |
//!      |                    +------------------ verify (misaligned) ---------+
//!      +---------------------------------------- verify (aligned) -----------+
//! ```
//!
//! Roles are swapped in a single upsert during `update-map`, so a stored shard
//! never has zero or two primaries.

use crate::config::HealthThresholds;
use crate::core::{
    FailoverProgress, NodeRole, NodeStatus, Region, Result, ShardError, ShardMapEntry,
    ShardNode, ShardState,
};
use crate::events::{EventKind, EventLog};
use crate::topology::TopologyStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// The five canonical failover steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverStepKind {
    Detect,
    Declare,
    Promote,
    UpdateMap,
    Verify,
}

impl FailoverStepKind {
    pub const ORDER: [FailoverStepKind; 5] = [
        FailoverStepKind::Detect,
        FailoverStepKind::Declare,
        FailoverStepKind::Promote,
        FailoverStepKind::UpdateMap,
        FailoverStepKind::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverStepKind::Detect => "detect",
            FailoverStepKind::Declare => "declare",
            FailoverStepKind::Promote => "promote",
            FailoverStepKind::UpdateMap => "update-map",
            FailoverStepKind::Verify => "verify",
        }
    }
}

impl fmt::Display for FailoverStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailoverStep {
    pub name: FailoverStepKind,
    pub description: String,
}

/// Ordered remediation plan for replacing a shard's primary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailoverPlan {
    pub shard_id: String,
    pub promote_region: Region,
    pub current_primary_id: String,
    pub candidate_node_id: String,
    pub from_state: ShardState,
    pub target_state: ShardState,
    pub steps: Vec<FailoverStep>,
}

/// Health metrics reported by the data plane for the `detect` step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShardHealthReport {
    pub wal_backlog: u64,
    pub replica_lag_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectOutcome {
    pub shard_id: String,
    pub degraded: bool,
    pub reasons: Vec<String>,
}

/// One step of plan execution, issued by the data plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum FailoverCommand {
    Declare {
        #[serde(rename = "promoteRegion")]
        promote_region: Region,
    },
    Promote,
    UpdateMap,
    Verify {
        #[serde(rename = "primaryLsn")]
        primary_lsn: u64,
        #[serde(rename = "replicaLsns", default)]
        replica_lsns: Vec<u64>,
    },
}

impl FailoverCommand {
    pub fn step(&self) -> FailoverStepKind {
        match self {
            FailoverCommand::Declare { .. } => FailoverStepKind::Declare,
            FailoverCommand::Promote => FailoverStepKind::Promote,
            FailoverCommand::UpdateMap => FailoverStepKind::UpdateMap,
            FailoverCommand::Verify { .. } => FailoverStepKind::Verify,
        }
    }
}

/// Result of applying one `FailoverCommand`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailoverTransition {
    pub shard_id: String,
    pub step: FailoverStepKind,
    pub from_state: ShardState,
    pub to_state: ShardState,
    pub shard: ShardMapEntry,
}

/// Picks the node to promote: a non-primary in `region`, healthy first.
fn promotion_candidate(shard: &ShardMapEntry, region: Region) -> Result<&ShardNode> {
    let mut in_region = shard
        .nodes
        .iter()
        .filter(|node| node.region == region && node.role != NodeRole::Primary)
        .peekable();
    if in_region.peek().is_none() {
        return Err(ShardError::Validation(format!(
            "Shard '{}' has no standby or replica in {}",
            shard.shard_id, region
        )));
    }
    in_region.find(|node| node.is_healthy()).ok_or_else(|| {
        ShardError::Conflict(format!(
            "Shard '{}' has no healthy promotion candidate in {}",
            shard.shard_id, region
        ))
    })
}

fn current_primary(shard: &ShardMapEntry) -> Result<&ShardNode> {
    shard.primary().ok_or_else(|| {
        ShardError::Conflict(format!("Shard '{}' has no primary", shard.shard_id))
    })
}

/// Builds the canonical step list for promoting `candidate` in `region`.
pub fn canonical_steps(primary: &ShardNode, candidate: &ShardNode, region: Region) -> Vec<FailoverStep> {
    FailoverStepKind::ORDER
        .iter()
        .map(|kind| {
            let description = match kind {
                FailoverStepKind::Detect => {
                    "detect: monitor health + replication lag".to_string()
                }
                FailoverStepKind::Declare => {
                    format!("declare: mark primary {} degraded", primary.id)
                }
                FailoverStepKind::Promote => {
                    format!("promote: elect {} {} in {}", candidate.role, candidate.id, region)
                }
                FailoverStepKind::UpdateMap => {
                    "update-map: write shard map atomically".to_string()
                }
                FailoverStepKind::Verify => {
                    "verify: check LSN alignment before serving".to_string()
                }
            };
            FailoverStep {
                name: *kind,
                description,
            }
        })
        .collect()
}

/// Plans failovers and advances shards through the failover state machine.
pub struct FailoverPlanner {
    topology: Arc<TopologyStore>,
    events: Arc<EventLog>,
    thresholds: HealthThresholds,
    max_verify_lsn_gap: u64,
}

impl FailoverPlanner {
    pub fn new(topology: Arc<TopologyStore>, events: Arc<EventLog>) -> Self {
        Self::new_with_thresholds(topology, events, HealthThresholds::default(), 0)
    }

    pub fn new_with_thresholds(
        topology: Arc<TopologyStore>,
        events: Arc<EventLog>,
        thresholds: HealthThresholds,
        max_verify_lsn_gap: u64,
    ) -> Self {
        Self {
            topology,
            events,
            thresholds,
            max_verify_lsn_gap,
        }
    }

    /// Produces the ordered plan for promoting a node in `promote_region`.
    ///
    /// Re-planning a healthy shard is idempotent. A shard already mid-failover
    /// is rejected with `Conflict`.
    pub async fn plan_failover(&self, shard_id: &str, promote_region: Region) -> Result<FailoverPlan> {
        let shard = self.topology.require_shard(shard_id).await?;
        if shard.state.is_mid_failover() {
            return Err(ShardError::Conflict(format!(
                "Shard '{}' is already mid-failover ({})",
                shard_id, shard.state
            )));
        }

        let primary = current_primary(&shard)?;
        let candidate = promotion_candidate(&shard, promote_region)?;
        let plan = FailoverPlan {
            shard_id: shard.shard_id.clone(),
            promote_region,
            current_primary_id: primary.id.clone(),
            candidate_node_id: candidate.id.clone(),
            from_state: shard.state,
            target_state: ShardState::Healthy,
            steps: canonical_steps(primary, candidate, promote_region),
        };

        self.events.append(
            EventKind::FailoverPlanned,
            json!({
                "shardId": plan.shard_id,
                "promoteRegion": promote_region,
                "candidateNodeId": plan.candidate_node_id,
            }),
        )?;
        event!(
            Level::INFO,
            shard_id = %plan.shard_id,
            region = %promote_region,
            "failover planned"
        );
        Ok(plan)
    }

    /// Step 1: classifies data-plane health metrics without mutating state.
    pub async fn detect(&self, shard_id: &str, report: ShardHealthReport) -> Result<DetectOutcome> {
        let shard = self.topology.require_shard(shard_id).await?;
        let mut reasons = Vec::new();
        if report.replica_lag_secs > self.thresholds.max_replica_lag_secs {
            reasons.push(format!(
                "replica lag {}s exceeds {}s",
                report.replica_lag_secs, self.thresholds.max_replica_lag_secs
            ));
        }
        if report.wal_backlog > self.thresholds.max_wal_backlog {
            reasons.push(format!(
                "wal backlog {} exceeds {}",
                report.wal_backlog, self.thresholds.max_wal_backlog
            ));
        }
        if let Some(primary) = shard.primary().filter(|primary| !primary.is_healthy()) {
            reasons.push(format!("primary {} is {}", primary.id, primary.status));
        }
        Ok(DetectOutcome {
            shard_id: shard.shard_id,
            degraded: !reasons.is_empty(),
            reasons,
        })
    }

    /// Applies one plan step to the shard, serialized per shard.
    pub async fn advance(&self, shard_id: &str, command: FailoverCommand) -> Result<FailoverTransition> {
        let span = info_span!("failover_advance", shard_id = %shard_id, step = %command.step());
        self.advance_inner(shard_id, command).instrument(span).await
    }

    async fn advance_inner(&self, shard_id: &str, command: FailoverCommand) -> Result<FailoverTransition> {
        let _shard_guard = self.topology.lock_shard(shard_id).await?;
        let mut shard = self.topology.require_shard(shard_id).await?;
        let from_state = shard.state;
        let step = command.step();

        let (kind, detail) = match (from_state, command) {
            (ShardState::Healthy, FailoverCommand::Declare { promote_region }) => {
                let candidate_id = promotion_candidate(&shard, promote_region)?.id.clone();
                let primary_id = current_primary(&shard)?.id.clone();
                if let Some(primary) = shard.node_mut(&primary_id) {
                    primary.status = NodeStatus::Degraded;
                }
                shard.state = ShardState::Degraded;
                shard.failover = Some(FailoverProgress {
                    target_region: promote_region,
                    candidate_node_id: candidate_id.clone(),
                    previous_primary_id: primary_id.clone(),
                    started_at: Utc::now(),
                });
                (
                    EventKind::FailoverDeclared,
                    json!({
                        "shardId": shard_id,
                        "degradedPrimary": primary_id,
                        "candidateNodeId": candidate_id,
                    }),
                )
            }
            (ShardState::Degraded, FailoverCommand::Promote) => {
                let progress = Self::progress(&shard)?;
                let candidate = shard.node(&progress.candidate_node_id).ok_or_else(|| {
                    ShardError::Conflict(format!(
                        "Promotion candidate '{}' left shard '{}'",
                        progress.candidate_node_id, shard_id
                    ))
                })?;
                if !candidate.is_healthy() {
                    return Err(ShardError::Conflict(format!(
                        "Promotion candidate '{}' is {}",
                        candidate.id, candidate.status
                    )));
                }
                let candidate_id = candidate.id.clone();
                shard.state = ShardState::Promoting;
                (
                    EventKind::FailoverPromoting,
                    json!({ "shardId": shard_id, "candidateNodeId": candidate_id }),
                )
            }
            (ShardState::Promoting, FailoverCommand::UpdateMap) => {
                let progress = Self::progress(&shard)?;
                for node in shard.nodes.iter_mut() {
                    if node.id == progress.candidate_node_id {
                        node.role = NodeRole::Primary;
                    } else if node.role == NodeRole::Primary {
                        node.role = NodeRole::Standby;
                    }
                }
                shard.state = ShardState::Verifying;
                (
                    EventKind::FailoverMapUpdated,
                    json!({
                        "shardId": shard_id,
                        "primary": progress.candidate_node_id,
                        "region": progress.target_region,
                    }),
                )
            }
            (
                ShardState::Verifying,
                FailoverCommand::Verify {
                    primary_lsn,
                    replica_lsns,
                },
            ) => {
                let aligned = replica_lsns.iter().all(|lsn| {
                    *lsn <= primary_lsn && primary_lsn - *lsn <= self.max_verify_lsn_gap
                });
                if aligned {
                    shard.state = ShardState::Healthy;
                    shard.failover = None;
                    (
                        EventKind::FailoverCompleted,
                        json!({ "shardId": shard_id, "primaryLsn": primary_lsn }),
                    )
                } else {
                    shard.state = ShardState::Degraded;
                    (
                        EventKind::FailoverRolledBack,
                        json!({
                            "shardId": shard_id,
                            "primaryLsn": primary_lsn,
                            "replicaLsns": replica_lsns,
                        }),
                    )
                }
            }
            (state, command) => {
                return Err(ShardError::Conflict(format!(
                    "Cannot {} shard '{}' while it is {}",
                    command.step(),
                    shard_id,
                    state
                )));
            }
        };

        self.topology.upsert(shard.clone()).await?;
        self.events.append(kind, detail)?;
        event!(
            Level::INFO,
            from = %from_state,
            to = %shard.state,
            "failover step applied"
        );

        Ok(FailoverTransition {
            shard_id: shard.shard_id.clone(),
            step,
            from_state,
            to_state: shard.state,
            shard,
        })
    }

    /// Records a node status reported by the data plane.
    pub async fn report_node_status(
        &self,
        shard_id: &str,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<ShardMapEntry> {
        let _shard_guard = self.topology.lock_shard(shard_id).await?;
        let mut shard = self.topology.require_shard(shard_id).await?;
        let node = shard.node_mut(node_id).ok_or_else(|| {
            ShardError::NotFound(format!("Node '{}' on shard '{}'", node_id, shard_id))
        })?;
        if node.status == status {
            return Ok(shard);
        }
        let previous = node.status;
        node.status = status;
        let role = node.role;
        self.topology.upsert(shard.clone()).await?;
        self.events.append(
            EventKind::NodeStatusChanged,
            json!({
                "shardId": shard_id,
                "nodeId": node_id,
                "role": role,
                "from": previous,
                "to": status,
            }),
        )?;
        event!(
            Level::INFO,
            shard_id = %shard_id,
            node_id = %node_id,
            status = %status,
            "node status updated"
        );
        Ok(shard)
    }

    fn progress(shard: &ShardMapEntry) -> Result<FailoverProgress> {
        shard.failover.clone().ok_or_else(|| {
            ShardError::Conflict(format!(
                "Shard '{}' is {} without failover progress",
                shard.shard_id, shard.state
            ))
        })
    }
}
