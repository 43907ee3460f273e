use crate::core::{ConsistencyMode, NodeRole, Operation, Region, ShardMapEntry, ShardNode};

/// Chooses the node that should serve one request on `entry`.
///
/// Priority order:
/// 1. writes and strong reads go to the healthy primary, else the first node;
/// 2. relaxed reads honor `region_hint` when a healthy non-standby node is there;
/// 3. then any healthy replica;
/// 4. then any healthy node, else the first node.
///
/// Returns `None` only for a shard without nodes.
pub fn select_node(
    entry: &ShardMapEntry,
    op: Operation,
    consistency: ConsistencyMode,
    region_hint: Option<Region>,
) -> Option<&ShardNode> {
    let mut healthy = entry.nodes.iter().filter(|node| node.is_healthy());
    let first = entry.nodes.first();

    if op == Operation::Write || consistency == ConsistencyMode::Strong {
        return healthy
            .find(|node| node.role == NodeRole::Primary)
            .or(first);
    }

    if let Some(hint) = region_hint {
        let regional = entry.nodes.iter().find(|node| {
            node.is_healthy() && node.region == hint && node.role != NodeRole::Standby
        });
        if regional.is_some() {
            return regional;
        }
    }

    let replica = entry
        .nodes
        .iter()
        .find(|node| node.is_healthy() && node.role == NodeRole::Replica);
    if replica.is_some() {
        return replica;
    }

    healthy.next().or(first)
}
