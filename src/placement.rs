//! Placement engine: maps a fleet to the shard that serves it.
//!
//! Placement is idempotent per fleet. An already placed fleet gets its current
//! shard back unchanged, whatever the other request parameters say. New fleets
//! get a freshly synthesized two-node shard in the best admissible region.

use crate::core::{
    Durability, NodeRole, Region, Residency, Result, ShardError, ShardMapEntry, ShardNode,
    ShardState, Tier,
};
use crate::events::{EventKind, EventLog};
use crate::topology::TopologyStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Highest accepted hotness score.
pub const MAX_HOTNESS_SCORE: u32 = 100;

/// Workload requirements for placing one fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    pub fleet_id: String,
    #[serde(default)]
    pub preferred_regions: Vec<Region>,
    pub hotness_score: u32,
    #[serde(default = "default_residency")]
    pub residency: Residency,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default = "default_durability")]
    pub durability: Durability,
}

fn default_residency() -> Residency {
    Residency::Any
}

fn default_tier() -> Tier {
    Tier::Silver
}

fn default_durability() -> Durability {
    Durability::Standard
}

impl PlacementRequest {
    pub fn new(fleet_id: impl Into<String>, hotness_score: u32) -> Self {
        Self {
            fleet_id: fleet_id.into(),
            preferred_regions: Vec::new(),
            hotness_score,
            residency: default_residency(),
            tier: default_tier(),
            durability: default_durability(),
        }
    }

    pub fn preferred_regions(mut self, regions: Vec<Region>) -> Self {
        self.preferred_regions = regions;
        self
    }

    pub fn residency(mut self, residency: Residency) -> Self {
        self.residency = residency;
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fleet_id.trim().is_empty() {
            return Err(ShardError::Validation(
                "fleetId must not be empty".to_string(),
            ));
        }
        if self.hotness_score > MAX_HOTNESS_SCORE {
            return Err(ShardError::Validation(format!(
                "hotnessScore {} is out of range 0..={}",
                self.hotness_score, MAX_HOTNESS_SCORE
            )));
        }
        Ok(())
    }
}

/// Sums, per region, the fleet count of every shard with a node in that region.
///
/// A shard contributes once per node, so a shard spanning two regions adds
/// to both. Every known region is present in the result.
pub fn region_load_scores(shards: &[ShardMapEntry]) -> BTreeMap<Region, usize> {
    let mut scores: BTreeMap<Region, usize> =
        Region::ALL.iter().map(|region| (*region, 0)).collect();
    for shard in shards {
        for node in &shard.nodes {
            *scores.entry(node.region).or_default() += shard.fleets.len();
        }
    }
    scores
}

/// Picks the primary region for a new shard.
///
/// The first admissible preferred region wins. Otherwise the least loaded
/// admissible region is chosen, ties broken by region order.
pub fn select_region(
    preferred: &[Region],
    residency: Residency,
    scores: &BTreeMap<Region, usize>,
) -> Result<Region> {
    let candidates = residency.candidate_regions();
    if candidates.is_empty() {
        return Err(ShardError::NoCandidateRegion(residency));
    }

    if let Some(region) = preferred.iter().find(|region| residency.admits(**region)) {
        return Ok(*region);
    }

    candidates
        .into_iter()
        .min_by_key(|region| (scores.get(region).copied().unwrap_or_default(), *region))
        .ok_or(ShardError::NoCandidateRegion(residency))
}

/// Builds `shard-<region>-<hotness>`, appending `-2`, `-3`, ... on collision.
pub fn unique_shard_id(existing: &[ShardMapEntry], region: Region, hotness_score: u32) -> String {
    let taken: HashSet<&str> = existing.iter().map(|shard| shard.shard_id.as_str()).collect();
    let base = format!("shard-{}-{}", region, hotness_score);
    if !taken.contains(base.as_str()) {
        return base;
    }
    (2u32..)
        .map(|suffix| format!("{base}-{suffix}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or(base)
}

/// Synthesizes a new shard entry for `request` with its primary in `region`.
pub fn build_shard(shard_id: String, region: Region, request: &PlacementRequest) -> ShardMapEntry {
    let standby_region = region.failover_partner();
    let primary = ShardNode::new(
        format!("{shard_id}-primary"),
        region,
        region.primary_zone(),
        NodeRole::Primary,
    );
    let standby = ShardNode::new(
        format!("{shard_id}-standby"),
        standby_region,
        standby_region.standby_zone(),
        NodeRole::Standby,
    );
    let availability_zones = vec![
        primary.availability_zone.clone(),
        standby.availability_zone.clone(),
    ];

    ShardMapEntry {
        shard_id,
        fleets: vec![request.fleet_id.clone()],
        nodes: vec![primary, standby],
        replication_lane: request.tier.replication_lane(),
        consistency_tier: request.tier,
        durability_tier: request.durability,
        commit_policy: request.durability.commit_policy(),
        availability_zones,
        quota: request.tier.quota(),
        state: ShardState::Healthy,
        failover: None,
    }
}

/// Decides which shard serves a fleet, creating shards as needed.
pub struct PlacementEngine {
    topology: Arc<TopologyStore>,
    events: Arc<EventLog>,
}

impl PlacementEngine {
    pub fn new(topology: Arc<TopologyStore>, events: Arc<EventLog>) -> Self {
        Self { topology, events }
    }

    /// Returns the fleet's shard, placing it on a new shard when unplaced.
    pub async fn plan_placement(&self, request: PlacementRequest) -> Result<ShardMapEntry> {
        let span = info_span!(
            "plan_placement",
            fleet_id = %request.fleet_id,
            residency = %request.residency,
            tier = %request.tier
        );
        self.plan_placement_inner(request).instrument(span).await
    }

    async fn plan_placement_inner(&self, request: PlacementRequest) -> Result<ShardMapEntry> {
        request.validate()?;

        let _placement = self.topology.lock_placement().await;
        if let Some(existing) = self.topology.find_by_fleet(&request.fleet_id).await? {
            event!(
                Level::DEBUG,
                shard_id = %existing.shard_id,
                "fleet already placed"
            );
            return Ok(existing);
        }

        let shards = self.topology.get_all().await?;
        let scores = region_load_scores(&shards);
        let region = select_region(&request.preferred_regions, request.residency, &scores)?;
        let shard_id = unique_shard_id(&shards, region, request.hotness_score);
        let entry = build_shard(shard_id, region, &request);

        self.topology.upsert(entry.clone()).await?;
        self.events.append(
            EventKind::ShardAssigned,
            json!({
                "shardId": entry.shard_id,
                "fleetId": request.fleet_id,
                "region": region,
                "standbyRegion": region.failover_partner(),
                "tier": request.tier,
                "durability": request.durability,
                "hotnessScore": request.hotness_score,
            }),
        )?;
        event!(
            Level::INFO,
            shard_id = %entry.shard_id,
            region = %region,
            "fleet placed on new shard"
        );
        Ok(entry)
    }
}
