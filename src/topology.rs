//! Authoritative shard map.
//!
//! The store owns every `ShardMapEntry`. Only the placement engine and the
//! failover planner write through it. Backing storage is pluggable through
//! `ShardMapStorage`; the in-memory backend is the default.

use crate::core::{Result, ShardError, ShardMapEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock};

// Topology is split by concern: storage contract, default backend, store facade.
include!("topology/storage.rs");
include!("topology/in_memory.rs");
include!("topology/store.rs");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        CommitPolicy, Durability, NodeRole, Region, ReplicationLane, ShardNode, ShardState, Tier,
    };
    use std::time::Duration;

    fn shard(id: &str, fleet: &str) -> ShardMapEntry {
        ShardMapEntry {
            shard_id: id.to_string(),
            fleets: vec![fleet.to_string()],
            nodes: vec![
                ShardNode::new(format!("{id}-p"), Region::EuWest1, "eu-west-1a", NodeRole::Primary),
                ShardNode::new(format!("{id}-s"), Region::UsEast1, "us-east-1b", NodeRole::Standby),
            ],
            replication_lane: ReplicationLane::StreamingArchive,
            consistency_tier: Tier::Silver,
            durability_tier: Durability::Standard,
            commit_policy: CommitPolicy::RegionalQuorum,
            availability_zones: vec!["eu-west-1a".to_string(), "us-east-1b".to_string()],
            quota: Tier::Silver.quota(),
            state: ShardState::Healthy,
            failover: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = TopologyStore::in_memory();
        store.upsert(shard("s-1", "f-1")).await.unwrap();
        store.upsert(shard("s-2", "f-2")).await.unwrap();

        let mut updated = shard("s-1", "f-1");
        updated.fleets.push("f-3".to_string());
        store.upsert(updated).await.unwrap();

        let all = store.get_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|entry| entry.shard_id.as_str()).collect();
        assert_eq!(ids, vec!["s-1", "s-2"]);
        assert_eq!(
            store.find_by_fleet("f-3").await.unwrap().unwrap().shard_id,
            "s-1"
        );
    }

    #[tokio::test]
    async fn fleet_cannot_move_onto_a_second_shard() {
        let store = TopologyStore::in_memory();
        store.upsert(shard("s-1", "f-1")).await.unwrap();
        let err = store.upsert(shard("s-2", "f-1")).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(store.find_by_shard_id("s-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_entries_never_reach_storage() {
        let store = TopologyStore::in_memory();
        let mut broken = shard("s-1", "f-1");
        broken.nodes[1].role = NodeRole::Primary;
        assert!(store.upsert(broken).await.is_err());
        assert!(store.get_all().await.unwrap().is_empty());

        let mut broken = shard("s-1", "f-1");
        broken.nodes.clear();
        assert!(InMemoryShardMapStorage::with_entries(vec![broken]).is_err());
    }

    #[tokio::test]
    async fn preloaded_backend_is_visible_through_the_store() {
        let storage = InMemoryShardMapStorage::with_entries(vec![shard("s-1", "f-1")]).unwrap();
        let store = TopologyStore::new(Arc::new(storage));
        assert_eq!(store.require_shard("s-1").await.unwrap().fleets, vec!["f-1"]);
        assert_eq!(
            store.require_shard("s-9").await.unwrap_err(),
            ShardError::ShardNotFound("s-9".to_string())
        );
    }

    #[tokio::test]
    async fn shard_locks_serialize_per_shard_only() {
        let store = Arc::new(TopologyStore::in_memory());
        store.upsert(shard("s-1", "f-1")).await.unwrap();
        store.upsert(shard("s-2", "f-2")).await.unwrap();
        let held = store.lock_shard("s-1").await.unwrap();

        // A different shard is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(50), store.lock_shard("s-2")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), store.lock_shard("s-1")).await;
        assert!(same.is_err());

        drop(held);
        let same = tokio::time::timeout(Duration::from_millis(50), store.lock_shard("s-1")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn unknown_shards_get_no_lock() {
        let store = TopologyStore::in_memory();
        store.upsert(shard("s-1", "f-1")).await.unwrap();

        for i in 0..100 {
            let err = store.lock_shard(&format!("ghost-{i}")).await.unwrap_err();
            assert_eq!(err.kind(), "not_found");
        }
        assert_eq!(store.shard_lock_count().unwrap(), 0);

        drop(store.lock_shard("s-1").await.unwrap());
        drop(store.lock_shard("s-1").await.unwrap());
        assert_eq!(store.shard_lock_count().unwrap(), 1);
    }
}
