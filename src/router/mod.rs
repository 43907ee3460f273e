//! Data-plane routing.
//!
//! Each routing process keeps a TTL-bounded copy of the control plane's shard
//! map and selects a target node per request without contacting the control
//! plane on the hot path.

pub mod cache;
pub mod select;
pub mod source;

pub use cache::{CacheView, RouteDecision, RouteRequest, RouterCache};
pub use select::select_node;
pub use source::{HttpShardMapSource, ShardMapSource, TopologySource};
