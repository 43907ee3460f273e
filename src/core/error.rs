use super::types::Residency;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Shard '{0}' not found")]
    ShardNotFound(String),

    #[error("No shard serves fleet '{0}'")]
    FleetNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No region satisfies residency '{0}'")]
    NoCandidateRegion(Residency),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl ShardError {
    /// Stable, machine-readable error kind exposed to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ShardNotFound(_) | Self::FleetNotFound(_) | Self::NotFound(_) => "not_found",
            Self::NoCandidateRegion(_) => "no_candidate_region",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) | Self::LockError(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ShardError>;

impl<T> From<std::sync::PoisonError<T>> for ShardError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
