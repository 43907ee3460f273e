//! Tenant and fleet records.
//!
//! The placement engine never consults this catalog; referential integrity of
//! placement input is the caller's responsibility. Catalog operations only
//! check their own references (a fleet's owning tenant).

use crate::core::{ConsistencyMode, Fleet, Region, Result, ShardError, Tenant, Tier};
use crate::events::{EventKind, EventLog};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub name: String,
    pub sla_tier: Tier,
    #[serde(default)]
    pub dedicated_routers: bool,
    #[serde(default)]
    pub dedicated_shards: bool,
    #[serde(default)]
    pub encryption_key_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sla_tier: Option<Tier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewFleet {
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub preferred_regions: Vec<Region>,
    #[serde(default = "default_consistency")]
    pub consistency: ConsistencyMode,
}

fn default_consistency() -> ConsistencyMode {
    ConsistencyMode::Bounded
}

fn short_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..6])
}

fn require_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ShardError::Validation("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// Keyed access to tenant and fleet records.
///
/// Inserts must reject duplicate ids atomically. `put_tenant` replaces a
/// whole record.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    /// Returns every tenant in insertion order.
    async fn tenants(&self) -> Result<Vec<Tenant>>;

    async fn tenant(&self, id: &str) -> Result<Option<Tenant>>;

    /// Inserts a tenant, failing with `Conflict` when the id is taken.
    async fn insert_tenant(&self, tenant: Tenant) -> Result<()>;

    /// Replaces an existing tenant, failing with `NotFound` when absent.
    async fn put_tenant(&self, tenant: Tenant) -> Result<()>;

    /// Returns every fleet in insertion order.
    async fn fleets(&self) -> Result<Vec<Fleet>>;

    /// Inserts a fleet, failing with `Conflict` when the id is taken.
    async fn insert_fleet(&self, fleet: Fleet) -> Result<()>;
}

/// Process-local `CatalogStorage`.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStorage {
    tenants: RwLock<Vec<Tenant>>,
    fleets: RwLock<Vec<Fleet>>,
}

impl InMemoryCatalogStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tenant_not_found(id: &str) -> ShardError {
    ShardError::NotFound(format!("Tenant '{}'", id))
}

#[async_trait]
impl CatalogStorage for InMemoryCatalogStorage {
    async fn tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.read().await.clone())
    }

    async fn tenant(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .await
            .iter()
            .find(|tenant| tenant.id == id)
            .cloned())
    }

    async fn insert_tenant(&self, tenant: Tenant) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        if tenants.iter().any(|existing| existing.id == tenant.id) {
            return Err(ShardError::Conflict(format!(
                "Tenant '{}' already exists",
                tenant.id
            )));
        }
        tenants.push(tenant);
        Ok(())
    }

    async fn put_tenant(&self, tenant: Tenant) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let existing = tenants
            .iter_mut()
            .find(|existing| existing.id == tenant.id)
            .ok_or_else(|| tenant_not_found(&tenant.id))?;
        *existing = tenant;
        Ok(())
    }

    async fn fleets(&self) -> Result<Vec<Fleet>> {
        Ok(self.fleets.read().await.clone())
    }

    async fn insert_fleet(&self, fleet: Fleet) -> Result<()> {
        let mut fleets = self.fleets.write().await;
        if fleets.iter().any(|existing| existing.id == fleet.id) {
            return Err(ShardError::Conflict(format!(
                "Fleet '{}' already exists",
                fleet.id
            )));
        }
        fleets.push(fleet);
        Ok(())
    }
}

pub struct TenantCatalog {
    storage: Arc<dyn CatalogStorage>,
    events: Arc<EventLog>,
    /// Serializes read-modify-write tenant updates.
    update_lock: Mutex<()>,
}

impl TenantCatalog {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self::with_storage(Arc::new(InMemoryCatalogStorage::new()), events)
    }

    pub fn with_storage(storage: Arc<dyn CatalogStorage>, events: Arc<EventLog>) -> Self {
        Self {
            storage,
            events,
            update_lock: Mutex::new(()),
        }
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.storage.tenants().await
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.storage
            .tenant(id)
            .await?
            .ok_or_else(|| tenant_not_found(id))
    }

    pub async fn create_tenant(&self, request: NewTenant) -> Result<Tenant> {
        let tenant = Tenant {
            id: short_id("t"),
            name: require_name(&request.name)?,
            sla_tier: request.sla_tier,
            dedicated_routers: request.dedicated_routers,
            dedicated_shards: request.dedicated_shards,
            encryption_key_ref: request.encryption_key_ref,
        };
        self.insert_tenant(tenant.clone()).await?;
        self.events.append(
            EventKind::TenantCreated,
            json!({ "tenantId": tenant.id, "slaTier": tenant.sla_tier }),
        )?;
        Ok(tenant)
    }

    /// Inserts a fully formed tenant, rejecting duplicate ids.
    pub async fn insert_tenant(&self, tenant: Tenant) -> Result<()> {
        self.storage.insert_tenant(tenant).await
    }

    pub async fn update_tenant(&self, id: &str, update: TenantUpdate) -> Result<Tenant> {
        let name = update.name.as_deref().map(require_name).transpose()?;
        let updated = {
            let _update = self.update_lock.lock().await;
            let mut tenant = self.get_tenant(id).await?;
            if let Some(name) = name {
                tenant.name = name;
            }
            if let Some(tier) = update.sla_tier {
                tenant.sla_tier = tier;
            }
            self.storage.put_tenant(tenant.clone()).await?;
            tenant
        };
        self.events.append(
            EventKind::TenantUpdated,
            json!({ "tenantId": updated.id, "slaTier": updated.sla_tier }),
        )?;
        Ok(updated)
    }

    /// Lists fleets, optionally restricted to one tenant.
    pub async fn list_fleets(&self, tenant_id: Option<&str>) -> Result<Vec<Fleet>> {
        Ok(self
            .storage
            .fleets()
            .await?
            .into_iter()
            .filter(|fleet| tenant_id.is_none_or(|tenant| fleet.tenant_id == tenant))
            .collect())
    }

    pub async fn register_fleet(&self, request: NewFleet) -> Result<Fleet> {
        self.get_tenant(&request.tenant_id).await?;
        let id = match request.id.as_deref().map(str::trim) {
            Some("") | None => short_id("f"),
            Some(id) => id.to_string(),
        };
        let fleet = Fleet {
            id,
            tenant_id: request.tenant_id,
            name: require_name(&request.name)?,
            preferred_regions: request.preferred_regions,
            consistency: request.consistency,
        };
        self.insert_fleet(fleet.clone()).await?;
        self.events.append(
            EventKind::FleetRegistered,
            json!({ "fleetId": fleet.id, "tenantId": fleet.tenant_id }),
        )?;
        Ok(fleet)
    }

    /// Inserts a fully formed fleet, rejecting duplicate ids.
    pub async fn insert_fleet(&self, fleet: Fleet) -> Result<()> {
        self.storage.insert_fleet(fleet).await
    }
}
