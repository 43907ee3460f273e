pub mod error;
pub mod model;
pub mod types;

pub use error::{Result, ShardError};
pub use model::{FailoverProgress, Fleet, ShardMapEntry, ShardNode, ShardState, Tenant};
pub use types::{
    CommitPolicy, ConsistencyMode, Durability, NodeRole, NodeStatus, Operation, Region,
    ReplicationLane, Residency, ShardQuota, Tier,
};
