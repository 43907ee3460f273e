// ============================================================================
// Shardplane Library
// ============================================================================
//
// Control plane for multi-region shard placement and failover, plus the
// data-plane router cache that consumes its shard map.

pub mod core;
pub mod config;
pub mod events;
pub mod topology;
pub mod catalog;
pub mod placement;
pub mod failover;
pub mod policy;
pub mod control_plane;
pub mod router;
pub mod web;

// Re-export main types for convenience
pub use core::{
    CommitPolicy, ConsistencyMode, Durability, Fleet, NodeRole, NodeStatus, Operation, Region,
    ReplicationLane, Residency, Result, ShardError, ShardMapEntry, ShardNode, ShardState, Tenant,
    Tier,
};
pub use config::{ControlPlaneConfig, HealthThresholds, RouterConfig};
pub use catalog::{CatalogStorage, InMemoryCatalogStorage, TenantCatalog};
pub use control_plane::{ControlPlane, StorageBackends};
pub use events::{Event, EventKind, EventLog, EventSink, TracingEventSink};
pub use failover::{FailoverCommand, FailoverPlan, FailoverPlanner, FailoverStepKind};
pub use placement::{PlacementEngine, PlacementRequest};
pub use policy::{InMemoryPolicyStorage, PolicyDocument, PolicyDraft, PolicyStorage, PolicyStore};
pub use router::{RouteDecision, RouteRequest, RouterCache};
pub use topology::{InMemoryShardMapStorage, ShardMapStorage, TopologyStore};
