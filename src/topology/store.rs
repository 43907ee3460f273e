/// Consistency layer over a `ShardMapStorage` backend.
///
/// Every write is validated before it reaches storage, so a stored entry always
/// has exactly one primary and derived fields that agree with its tiers. Writers
/// serialize per shard through `lock_shard`; placement decisions serialize
/// through `lock_placement`.
pub struct TopologyStore {
    storage: Arc<dyn ShardMapStorage>,
    shard_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    placement_lock: Mutex<()>,
}

impl TopologyStore {
    pub fn new(storage: Arc<dyn ShardMapStorage>) -> Self {
        Self {
            storage,
            shard_locks: std::sync::Mutex::new(HashMap::new()),
            placement_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryShardMapStorage::new()))
    }

    /// Returns a consistent snapshot of the whole shard map.
    pub async fn get_all(&self) -> Result<Vec<ShardMapEntry>> {
        self.storage.scan().await
    }

    pub async fn find_by_fleet(&self, fleet_id: &str) -> Result<Option<ShardMapEntry>> {
        self.storage.find_by_fleet(fleet_id).await
    }

    pub async fn find_by_shard_id(&self, shard_id: &str) -> Result<Option<ShardMapEntry>> {
        self.storage.get(shard_id).await
    }

    /// Like `find_by_shard_id`, failing with `ShardNotFound` when absent.
    pub async fn require_shard(&self, shard_id: &str) -> Result<ShardMapEntry> {
        self.find_by_shard_id(shard_id)
            .await?
            .ok_or_else(|| ShardError::ShardNotFound(shard_id.to_string()))
    }

    /// Validates and writes a full entry.
    ///
    /// Rejects entries that break shard invariants or that claim a fleet
    /// already served by a different shard.
    pub async fn upsert(&self, entry: ShardMapEntry) -> Result<()> {
        entry.validate()?;
        let snapshot = self.storage.scan().await?;
        for other in snapshot
            .iter()
            .filter(|other| other.shard_id != entry.shard_id)
        {
            if let Some(fleet) = entry.fleets.iter().find(|fleet| other.serves_fleet(fleet)) {
                return Err(ShardError::Conflict(format!(
                    "Fleet '{}' is already served by shard '{}'",
                    fleet, other.shard_id
                )));
            }
        }
        self.storage.upsert(entry).await
    }

    /// Acquires the write lock for a single existing shard.
    ///
    /// Unknown ids fail with `ShardNotFound` before a lock is allocated, so
    /// the lock table never outgrows the shard map.
    pub async fn lock_shard(&self, shard_id: &str) -> Result<OwnedMutexGuard<()>> {
        self.require_shard(shard_id).await?;
        let lock = {
            let mut locks = self.shard_locks.lock()?;
            locks
                .entry(shard_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Number of shards that have had a write lock allocated.
    pub fn shard_lock_count(&self) -> Result<usize> {
        Ok(self.shard_locks.lock()?.len())
    }

    /// Acquires the global placement lock.
    pub async fn lock_placement(&self) -> MutexGuard<'_, ()> {
        self.placement_lock.lock().await
    }
}
