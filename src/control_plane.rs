use crate::catalog::{CatalogStorage, InMemoryCatalogStorage, TenantCatalog};
use crate::config::ControlPlaneConfig;
use crate::core::{
    CommitPolicy, ConsistencyMode, Durability, Fleet, NodeRole, Region, ReplicationLane, Result,
    ShardMapEntry, ShardNode, ShardState, Tenant, Tier,
};
use crate::events::EventLog;
use crate::failover::FailoverPlanner;
use crate::placement::PlacementEngine;
use crate::policy::{InMemoryPolicyStorage, PolicyStorage, PolicyStore};
use crate::topology::{InMemoryShardMapStorage, ShardMapStorage, TopologyStore};
use std::sync::Arc;
use tracing::{Level, event};

/// Storage behind each record family.
///
/// Two control planes built over clones of the same backends share state.
#[derive(Clone)]
pub struct StorageBackends {
    pub shards: Arc<dyn ShardMapStorage>,
    pub catalog: Arc<dyn CatalogStorage>,
    pub policies: Arc<dyn PolicyStorage>,
}

impl StorageBackends {
    pub fn in_memory() -> Self {
        Self {
            shards: Arc::new(InMemoryShardMapStorage::new()),
            catalog: Arc::new(InMemoryCatalogStorage::new()),
            policies: Arc::new(InMemoryPolicyStorage::new()),
        }
    }
}

/// Wires the control-plane components around one topology store and event log.
#[derive(Clone)]
pub struct ControlPlane {
    pub topology: Arc<TopologyStore>,
    pub events: Arc<EventLog>,
    pub placement: Arc<PlacementEngine>,
    pub failover: Arc<FailoverPlanner>,
    pub policies: Arc<PolicyStore>,
    pub catalog: Arc<TenantCatalog>,
}

impl ControlPlane {
    /// Builds a control plane over in-memory storage.
    pub fn new(config: &ControlPlaneConfig) -> Result<Self> {
        Self::with_storage(config, StorageBackends::in_memory())
    }

    /// Builds a control plane over injected storage backends.
    pub fn with_storage(config: &ControlPlaneConfig, storage: StorageBackends) -> Result<Self> {
        config.validate()?;
        let topology = Arc::new(TopologyStore::new(storage.shards));
        let events = Arc::new(EventLog::new(config.event_log_capacity)?);
        let placement = Arc::new(PlacementEngine::new(topology.clone(), events.clone()));
        let failover = Arc::new(FailoverPlanner::new_with_thresholds(
            topology.clone(),
            events.clone(),
            config.health,
            config.max_verify_lsn_gap,
        ));
        let policies = Arc::new(PolicyStore::with_storage(storage.policies, events.clone()));
        let catalog = Arc::new(TenantCatalog::with_storage(storage.catalog, events.clone()));
        Ok(Self {
            topology,
            events,
            placement,
            failover,
            policies,
            catalog,
        })
    }

    /// Builds a control plane and loads the reference topology when configured.
    pub async fn bootstrap(config: &ControlPlaneConfig) -> Result<Self> {
        let control = Self::new(config)?;
        if config.seed_demo {
            control.seed_demo().await?;
        }
        Ok(control)
    }

    /// Loads the reference tenants, fleets and two shards.
    pub async fn seed_demo(&self) -> Result<()> {
        for tenant in demo_tenants() {
            self.catalog.insert_tenant(tenant).await?;
        }
        for fleet in demo_fleets() {
            self.catalog.insert_fleet(fleet).await?;
        }
        for shard in demo_shards() {
            self.topology.upsert(shard).await?;
        }
        event!(Level::INFO, "demo topology seeded");
        Ok(())
    }
}

fn demo_tenants() -> Vec<Tenant> {
    vec![
        Tenant {
            id: "t-acme".to_string(),
            name: "Acme Logistics".to_string(),
            sla_tier: Tier::Gold,
            dedicated_routers: false,
            dedicated_shards: false,
            encryption_key_ref: None,
        },
        Tenant {
            id: "t-globex".to_string(),
            name: "Globex Fleet".to_string(),
            sla_tier: Tier::Silver,
            dedicated_routers: false,
            dedicated_shards: false,
            encryption_key_ref: None,
        },
    ]
}

fn demo_fleets() -> Vec<Fleet> {
    let fleet =
        |id: &str, tenant: &str, name: &str, region: Region, consistency: ConsistencyMode| Fleet {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            preferred_regions: vec![region],
            consistency,
        };
    vec![
        fleet("f-acme-ny", "t-acme", "Acme NY", Region::UsEast1, ConsistencyMode::Strong),
        fleet("f-acme-eu", "t-acme", "Acme EU", Region::EuWest1, ConsistencyMode::Bounded),
        fleet(
            "f-globex-west",
            "t-globex",
            "Globex West",
            Region::UsWest2,
            ConsistencyMode::Eventual,
        ),
    ]
}

fn demo_shard(
    shard_id: &str,
    fleets: &[&str],
    primary: Region,
    standby: Region,
    tier: Tier,
    durability: Durability,
    replication_lane: ReplicationLane,
) -> ShardMapEntry {
    let nodes = vec![
        ShardNode::new(
            format!("n-{}-primary", shard_id.trim_start_matches("shard-")),
            primary,
            primary.primary_zone(),
            NodeRole::Primary,
        ),
        ShardNode::new(
            format!("n-{}-standby", shard_id.trim_start_matches("shard-")),
            standby,
            standby.standby_zone(),
            NodeRole::Standby,
        ),
    ];
    ShardMapEntry {
        shard_id: shard_id.to_string(),
        fleets: fleets.iter().map(|fleet| fleet.to_string()).collect(),
        availability_zones: nodes
            .iter()
            .map(|node| node.availability_zone.clone())
            .collect(),
        nodes,
        replication_lane,
        consistency_tier: tier,
        durability_tier: durability,
        commit_policy: CommitPolicy::RegionalQuorum,
        quota: tier.quota(),
        state: ShardState::Healthy,
        failover: None,
    }
}

fn demo_shards() -> Vec<ShardMapEntry> {
    vec![
        demo_shard(
            "shard-a1",
            &["f-acme-ny"],
            Region::UsEast1,
            Region::UsWest2,
            Tier::Gold,
            Durability::Enhanced,
            ReplicationLane::StreamingArchive,
        ),
        demo_shard(
            "shard-b1",
            &["f-acme-eu", "f-globex-west"],
            Region::EuWest1,
            Region::UsEast1,
            Tier::Silver,
            Durability::Standard,
            ReplicationLane::ArchiveOnly,
        ),
    ]
}
