/// Process-local `ShardMapStorage` backed by an ordered vector.
#[derive(Debug, Default)]
pub struct InMemoryShardMapStorage {
    entries: RwLock<Vec<ShardMapEntry>>,
}

impl InMemoryShardMapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with `entries`, validating each one.
    pub fn with_entries(entries: Vec<ShardMapEntry>) -> Result<Self> {
        for entry in &entries {
            entry.validate()?;
        }
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }
}

#[async_trait]
impl ShardMapStorage for InMemoryShardMapStorage {
    async fn scan(&self) -> Result<Vec<ShardMapEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn get(&self, shard_id: &str) -> Result<Option<ShardMapEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|entry| entry.shard_id == shard_id)
            .cloned())
    }

    async fn upsert(&self, entry: ShardMapEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries
            .iter_mut()
            .find(|existing| existing.shard_id == entry.shard_id)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }
}
