/// Durable key-value access to shard map records, keyed by shard id.
///
/// Implementations must make `upsert` atomic for a whole entry and must return
/// a consistent snapshot from `scan`.
#[async_trait]
pub trait ShardMapStorage: Send + Sync {
    /// Returns every entry in insertion order.
    async fn scan(&self) -> Result<Vec<ShardMapEntry>>;

    /// Returns a single entry by shard id.
    async fn get(&self, shard_id: &str) -> Result<Option<ShardMapEntry>>;

    /// Inserts or replaces an entry.
    async fn upsert(&self, entry: ShardMapEntry) -> Result<()>;

    /// Returns the entry that serves `fleet_id`, if any.
    async fn find_by_fleet(&self, fleet_id: &str) -> Result<Option<ShardMapEntry>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .find(|entry| entry.serves_fleet(fleet_id)))
    }
}
