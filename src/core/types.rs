use super::error::{Result, ShardError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Declares a closed enum whose wire form is a fixed string per variant.
///
/// Generates `as_str`, `ALL`, `Display`, `FromStr` (rejecting unknown values with
/// `ShardError::Validation`) and string-based serde impls.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ShardError;

            fn from_str(value: &str) -> Result<Self> {
                match value {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ShardError::Validation(format!(
                        "invalid {} '{}', expected one of: {}",
                        $label,
                        other,
                        [$($wire),+].join(", ")
                    ))),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_enum! {
    /// Deployment region. Variant order is the identifier's natural ordering.
    Region, "region" {
        EuWest1 => "eu-west-1",
        UsEast1 => "us-east-1",
        UsWest2 => "us-west-2",
    }
}

wire_enum! {
    /// Data residency constraint for placement.
    Residency, "residency" {
        UsOnly => "us-only",
        EuOnly => "eu-only",
        Any => "any",
    }
}

wire_enum! {
    /// SLA / consistency tier.
    Tier, "tier" {
        Bronze => "bronze",
        Silver => "silver",
        Gold => "gold",
    }
}

wire_enum! {
    Durability, "durability" {
        Standard => "standard",
        Enhanced => "enhanced",
        Platinum => "platinum",
    }
}

wire_enum! {
    /// Read consistency requested by a fleet or a single request.
    ConsistencyMode, "consistency" {
        Strong => "strong",
        Bounded => "bounded",
        Eventual => "eventual",
    }
}

wire_enum! {
    NodeRole, "role" {
        Primary => "primary",
        Replica => "replica",
        Standby => "standby",
    }
}

wire_enum! {
    NodeStatus, "status" {
        Healthy => "healthy",
        Degraded => "degraded",
        Unreachable => "unreachable",
    }
}

wire_enum! {
    ReplicationLane, "replication lane" {
        ArchiveOnly => "archive-only",
        StreamingArchive => "streaming+archive",
    }
}

wire_enum! {
    CommitPolicy, "commit policy" {
        RegionalQuorum => "regional-quorum",
        GlobalQuorum => "global-quorum",
    }
}

wire_enum! {
    /// Request operation routed by the data plane.
    Operation, "operation" {
        Read => "read",
        Write => "write",
    }
}

impl Region {
    pub fn is_us(&self) -> bool {
        matches!(self, Region::UsEast1 | Region::UsWest2)
    }

    pub fn is_eu(&self) -> bool {
        matches!(self, Region::EuWest1)
    }

    /// Designated failover partner used for standby placement.
    pub fn failover_partner(&self) -> Region {
        match self {
            Region::UsEast1 => Region::UsWest2,
            _ => Region::UsEast1,
        }
    }

    pub fn availability_zones(&self) -> [String; 3] {
        let base = self.as_str();
        [format!("{base}a"), format!("{base}b"), format!("{base}c")]
    }

    pub fn primary_zone(&self) -> String {
        format!("{}a", self.as_str())
    }

    pub fn standby_zone(&self) -> String {
        format!("{}b", self.as_str())
    }
}

impl Residency {
    pub fn admits(&self, region: Region) -> bool {
        match self {
            Residency::UsOnly => region.is_us(),
            Residency::EuOnly => region.is_eu(),
            Residency::Any => true,
        }
    }

    /// Regions admitted by this residency, in natural order.
    pub fn candidate_regions(&self) -> Vec<Region> {
        Region::ALL
            .iter()
            .copied()
            .filter(|region| self.admits(*region))
            .collect()
    }
}

/// Per-shard admission limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShardQuota {
    pub max_qps: u32,
    pub max_storage_gb: u32,
}

impl Tier {
    pub fn quota(&self) -> ShardQuota {
        match self {
            Tier::Bronze => ShardQuota {
                max_qps: 1_000,
                max_storage_gb: 100,
            },
            Tier::Silver => ShardQuota {
                max_qps: 5_000,
                max_storage_gb: 500,
            },
            Tier::Gold => ShardQuota {
                max_qps: 20_000,
                max_storage_gb: 2_000,
            },
        }
    }

    pub fn replication_lane(&self) -> ReplicationLane {
        match self {
            Tier::Bronze => ReplicationLane::ArchiveOnly,
            Tier::Silver | Tier::Gold => ReplicationLane::StreamingArchive,
        }
    }
}

impl Durability {
    pub fn commit_policy(&self) -> CommitPolicy {
        match self {
            Durability::Platinum => CommitPolicy::GlobalQuorum,
            Durability::Standard | Durability::Enhanced => CommitPolicy::RegionalQuorum,
        }
    }
}
