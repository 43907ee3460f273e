//! Versioned policy documents.
//!
//! Documents are never mutated in place: every accepted submission appends a
//! new version. Validation is advisory; semantic concerns become notes on the
//! submission result, only malformed input is rejected.

use crate::core::{ConsistencyMode, Durability, Residency, Result, ShardError, Tier};
use crate::events::{EventKind, EventLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};
use uuid::Uuid;

pub const GOLD_WITHOUT_RESIDENCY_NOTE: &str =
    "gold tier without explicit residency defaults to global placement";
pub const APPROVERS_MISSING_NOTE: &str = "approvals required but no approver roles listed";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTarget {
    pub target_p95_ms: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CostEnvelope {
    pub max_spend_usd: u64,
    pub autoscale_max_nodes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperationalGate {
    pub approvals_required: bool,
    #[serde(default)]
    pub approver_roles: Vec<String>,
}

/// A policy as submitted by an operator, before versioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    /// Existing id to supersede, or `None` for a new policy.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub durability: Durability,
    pub consistency: ConsistencyMode,
    #[serde(default = "default_residency")]
    pub residency: Residency,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default)]
    pub performance: PerformanceTarget,
    #[serde(default)]
    pub cost: CostEnvelope,
    #[serde(default)]
    pub operational: OperationalGate,
    #[serde(default)]
    pub enforce_dedicated_routers: bool,
    #[serde(default)]
    pub enforce_dedicated_shards: bool,
}

fn default_residency() -> Residency {
    Residency::Any
}

fn default_tier() -> Tier {
    Tier::Silver
}

impl PolicyDraft {
    pub fn new(durability: Durability, consistency: ConsistencyMode) -> Self {
        Self {
            id: None,
            tenant_id: None,
            durability,
            consistency,
            residency: default_residency(),
            tier: default_tier(),
            performance: PerformanceTarget::default(),
            cost: CostEnvelope::default(),
            operational: OperationalGate::default(),
            enforce_dedicated_routers: false,
            enforce_dedicated_shards: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
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

    pub fn operational(mut self, operational: OperationalGate) -> Self {
        self.operational = operational;
        self
    }
}

/// An accepted, immutable policy version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    pub id: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub durability: Durability,
    pub consistency: ConsistencyMode,
    pub residency: Residency,
    pub tier: Tier,
    pub performance: PerformanceTarget,
    pub cost: CostEnvelope,
    pub operational: OperationalGate,
    pub enforce_dedicated_routers: bool,
    pub enforce_dedicated_shards: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyValidation {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySubmission {
    pub policy: PolicyDocument,
    pub validation: PolicyValidation,
}

/// Advisory checks; never rejects.
pub fn validate_policy(draft: &PolicyDraft) -> PolicyValidation {
    let mut notes = Vec::new();
    if draft.tier == Tier::Gold && draft.residency == Residency::Any {
        notes.push(GOLD_WITHOUT_RESIDENCY_NOTE.to_string());
    }
    if draft.operational.approvals_required && draft.operational.approver_roles.is_empty() {
        notes.push(APPROVERS_MISSING_NOTE.to_string());
    }
    PolicyValidation { ok: true, notes }
}

/// Append-only persistence for policy versions.
#[async_trait]
pub trait PolicyStorage: Send + Sync {
    /// Returns every stored version in append order.
    async fn scan(&self) -> Result<Vec<PolicyDocument>>;

    /// Returns the versions of one policy, oldest first.
    async fn versions_of(&self, id: &str) -> Result<Vec<PolicyDocument>>;

    /// Stores `policy` as the next version of its id and returns it.
    ///
    /// The incoming `version` is ignored; implementations assign
    /// `max + 1` atomically with the write.
    async fn append(&self, policy: PolicyDocument) -> Result<PolicyDocument>;
}

/// Process-local `PolicyStorage`.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStorage {
    versions: RwLock<Vec<PolicyDocument>>,
}

impl InMemoryPolicyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStorage for InMemoryPolicyStorage {
    async fn scan(&self) -> Result<Vec<PolicyDocument>> {
        Ok(self.versions.read().await.clone())
    }

    async fn versions_of(&self, id: &str) -> Result<Vec<PolicyDocument>> {
        let versions = self.versions.read().await;
        Ok(versions.iter().filter(|doc| doc.id == id).cloned().collect())
    }

    async fn append(&self, mut policy: PolicyDocument) -> Result<PolicyDocument> {
        let mut versions = self.versions.write().await;
        policy.version = versions
            .iter()
            .filter(|doc| doc.id == policy.id)
            .map(|doc| doc.version)
            .max()
            .unwrap_or(0)
            + 1;
        versions.push(policy.clone());
        Ok(policy)
    }
}

/// Versioned policy operations over a `PolicyStorage`.
pub struct PolicyStore {
    storage: Arc<dyn PolicyStorage>,
    events: Arc<EventLog>,
}

impl PolicyStore {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self::with_storage(Arc::new(InMemoryPolicyStorage::new()), events)
    }

    pub fn with_storage(storage: Arc<dyn PolicyStorage>, events: Arc<EventLog>) -> Self {
        Self { storage, events }
    }

    /// Returns the latest version of every policy, in creation order.
    pub async fn get_policies(&self) -> Result<Vec<PolicyDocument>> {
        let versions = self.storage.scan().await?;
        let mut seen = HashSet::new();
        let mut latest: Vec<PolicyDocument> = Vec::new();
        for doc in versions.iter().rev() {
            if seen.insert(doc.id.as_str()) {
                latest.push(doc.clone());
            }
        }
        latest.reverse();
        Ok(latest)
    }

    /// Returns the latest version of one policy.
    pub async fn get_policy(&self, id: &str) -> Result<PolicyDocument> {
        self.storage
            .versions_of(id)
            .await?
            .into_iter()
            .max_by_key(|doc| doc.version)
            .ok_or_else(|| ShardError::NotFound(format!("Policy '{}'", id)))
    }

    /// Returns every version of one policy, oldest first.
    pub async fn history(&self, id: &str) -> Result<Vec<PolicyDocument>> {
        self.storage.versions_of(id).await
    }

    /// Accepts a draft as a new version and records a `policy.updated` event.
    pub async fn submit_policy(&self, draft: PolicyDraft) -> Result<PolicySubmission> {
        let id = match draft.id.as_deref().map(str::trim) {
            Some("") => {
                return Err(ShardError::Validation(
                    "policy id must not be empty".to_string(),
                ));
            }
            Some(id) => id.to_string(),
            None => format!("pol-{}", &Uuid::new_v4().simple().to_string()[..8]),
        };
        let validation = validate_policy(&draft);

        let policy = self
            .storage
            .append(PolicyDocument {
                id,
                version: 0,
                tenant_id: draft.tenant_id,
                durability: draft.durability,
                consistency: draft.consistency,
                residency: draft.residency,
                tier: draft.tier,
                performance: draft.performance,
                cost: draft.cost,
                operational: draft.operational,
                enforce_dedicated_routers: draft.enforce_dedicated_routers,
                enforce_dedicated_shards: draft.enforce_dedicated_shards,
                created_at: Utc::now(),
            })
            .await?;

        self.events.append(
            EventKind::PolicyUpdated,
            json!({
                "policyId": policy.id,
                "version": policy.version,
                "notes": validation.notes,
            }),
        )?;
        event!(
            Level::INFO,
            policy_id = %policy.id,
            version = policy.version,
            "policy version accepted"
        );
        Ok(PolicySubmission { policy, validation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PolicyStore {
        PolicyStore::new(Arc::new(EventLog::new(8).unwrap()))
    }

    #[tokio::test]
    async fn gold_with_any_residency_is_accepted_with_note() {
        let store = store();
        let submission = store
            .submit_policy(
                PolicyDraft::new(Durability::Platinum, ConsistencyMode::Strong).tier(Tier::Gold),
            )
            .await
            .unwrap();
        assert!(submission.validation.ok);
        assert_eq!(
            submission.validation.notes,
            vec![GOLD_WITHOUT_RESIDENCY_NOTE.to_string()]
        );
        assert_eq!(submission.policy.version, 1);
    }

    #[tokio::test]
    async fn resubmission_appends_new_version() {
        let store = store();
        let draft = PolicyDraft::new(Durability::Standard, ConsistencyMode::Bounded).id("pol-core");
        store.submit_policy(draft.clone()).await.unwrap();
        let second = store
            .submit_policy(draft.residency(Residency::EuOnly))
            .await
            .unwrap();
        assert_eq!(second.policy.version, 2);

        let latest = store.get_policies().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].residency, Residency::EuOnly);
        assert_eq!(store.history("pol-core").await.unwrap().len(), 2);
        assert!(store.get_policy("pol-missing").await.is_err());
    }

    #[tokio::test]
    async fn blank_id_is_rejected_before_any_write() {
        let store = store();
        let err = store
            .submit_policy(PolicyDraft::new(Durability::Standard, ConsistencyMode::Eventual).id("  "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(store.get_policies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_submissions_get_distinct_versions() {
        let store = store();
        let draft = PolicyDraft::new(Durability::Standard, ConsistencyMode::Strong).id("pol-race");
        let submissions = futures::future::join_all(
            (0..6).map(|_| store.submit_policy(draft.clone())),
        )
        .await;
        let mut versions: Vec<u64> = submissions
            .into_iter()
            .map(|submission| submission.unwrap().policy.version)
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=6).collect::<Vec<_>>());
        assert_eq!(store.get_policy("pol-race").await.unwrap().version, 6);
    }
}
