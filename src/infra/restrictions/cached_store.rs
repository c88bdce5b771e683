// Read-through cache in front of any restriction store.
//
// Every message in every channel hits `get_restriction`, and almost all of
// them are for unrestricted channels, so absence is cached too. Writes go
// straight to the inner store and drop the affected entry.
//
// A generation counter stops a read that started before a write from
// re-inserting the stale value after the write invalidated it. Both the
// bump and the fill's check run under the entry's shard lock, so a fill
// either sees the new generation or lands before the remove.

use crate::core::restrictions::{
    BypassRoleStore, ConfigStore, RestrictionRecord, RestrictionStore, StoreError,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CacheEntry<T> {
    value: T,
    cached_at: Instant,
}

pub struct CachedRestrictionStore<S> {
    inner: S,
    ttl: Duration,
    restrictions: DashMap<u64, CacheEntry<Option<RestrictionRecord>>>,
    bypass_roles: DashMap<u64, CacheEntry<HashSet<u64>>>,
    generation: AtomicU64,
}

impl<S> CachedRestrictionStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            restrictions: DashMap::new(),
            bypass_roles: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn invalidate_channel(&self, channel_id: u64) {
        invalidate(&self.restrictions, channel_id, &self.generation);
    }

    pub fn invalidate_guild_roles(&self, guild_id: u64) {
        invalidate(&self.bypass_roles, guild_id, &self.generation);
    }

    fn fresh<T: Clone>(&self, entry: &CacheEntry<T>) -> Option<T> {
        (entry.cached_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    fn cached_restriction(&self, channel_id: u64) -> Option<Option<RestrictionRecord>> {
        self.restrictions
            .get(&channel_id)
            .and_then(|entry| self.fresh(entry.value()))
    }

    fn cached_roles(&self, guild_id: u64) -> Option<HashSet<u64>> {
        self.bypass_roles
            .get(&guild_id)
            .and_then(|entry| self.fresh(entry.value()))
    }
}

fn invalidate<T>(map: &DashMap<u64, CacheEntry<T>>, key: u64, generation: &AtomicU64) {
    let entry = map.entry(key);
    generation.fetch_add(1, Ordering::AcqRel);
    if let Entry::Occupied(occupied) = entry {
        occupied.remove();
    }
}

/// Cache `value` unless an invalidation ran since `seen` was read.
fn fill<T>(map: &DashMap<u64, CacheEntry<T>>, key: u64, generation: &AtomicU64, seen: u64, value: T) {
    let entry = map.entry(key);
    if generation.load(Ordering::Acquire) == seen {
        entry.insert(CacheEntry {
            value,
            cached_at: Instant::now(),
        });
    }
}

#[async_trait]
impl<S: ConfigStore> ConfigStore for CachedRestrictionStore<S> {
    async fn get_restriction(
        &self,
        channel_id: u64,
    ) -> Result<Option<RestrictionRecord>, StoreError> {
        if let Some(hit) = self.cached_restriction(channel_id) {
            return Ok(hit);
        }

        let seen = self.generation.load(Ordering::Acquire);
        let record = self.inner.get_restriction(channel_id).await?;
        fill(&self.restrictions, channel_id, &self.generation, seen, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl<S: BypassRoleStore> BypassRoleStore for CachedRestrictionStore<S> {
    async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError> {
        if let Some(hit) = self.cached_roles(guild_id) {
            return Ok(hit);
        }

        let seen = self.generation.load(Ordering::Acquire);
        let roles = self.inner.get_bypass_roles(guild_id).await?;
        fill(&self.bypass_roles, guild_id, &self.generation, seen, roles.clone());
        Ok(roles)
    }

    async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        let added = self.inner.add_bypass_role(guild_id, role_id).await;
        self.invalidate_guild_roles(guild_id);
        added
    }

    async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        let removed = self.inner.remove_bypass_role(guild_id, role_id).await;
        self.invalidate_guild_roles(guild_id);
        removed
    }
}

#[async_trait]
impl<S: RestrictionStore> RestrictionStore for CachedRestrictionStore<S> {
    async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError> {
        let channel_id = record.channel_id;
        let saved = self.inner.save_restriction(record).await;
        self.invalidate_channel(channel_id);
        saved
    }

    async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError> {
        let deleted = self.inner.delete_restriction(channel_id).await;
        self.invalidate_channel(channel_id);
        deleted
    }

    // Listing is authoring-only and always reads through.
    async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError> {
        self.inner.list_restrictions(guild_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::restrictions::{LegacyPreset, RestrictionConfig};
    use crate::infra::restrictions::InMemoryRestrictionStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Counts reads that reach the backing store. With `hold_reads` set, a
    /// restriction read fetches its value and then waits for `release`.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryRestrictionStore,
        restriction_reads: AtomicUsize,
        role_reads: AtomicUsize,
        hold_reads: AtomicBool,
        read_started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn get_restriction(
            &self,
            channel_id: u64,
        ) -> Result<Option<RestrictionRecord>, StoreError> {
            self.restriction_reads.fetch_add(1, Ordering::SeqCst);
            let record = self.inner.get_restriction(channel_id).await;
            if self.hold_reads.load(Ordering::SeqCst) {
                self.read_started.notify_one();
                self.release.notified().await;
            }
            record
        }
    }

    #[async_trait]
    impl BypassRoleStore for CountingStore {
        async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError> {
            self.role_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_bypass_roles(guild_id).await
        }

        async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
            self.inner.add_bypass_role(guild_id, role_id).await
        }

        async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
            self.inner.remove_bypass_role(guild_id, role_id).await
        }
    }

    #[async_trait]
    impl RestrictionStore for CountingStore {
        async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError> {
            self.inner.save_restriction(record).await
        }

        async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError> {
            self.inner.delete_restriction(channel_id).await
        }

        async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError> {
            self.inner.list_restrictions(guild_id).await
        }
    }

    fn cached(ttl: Duration) -> (CachedRestrictionStore<Arc<CountingStore>>, Arc<CountingStore>) {
        let inner = Arc::new(CountingStore::default());
        (CachedRestrictionStore::new(Arc::clone(&inner), ttl), inner)
    }

    fn record(channel_id: u64) -> RestrictionRecord {
        RestrictionConfig::from_preset(1, channel_id, LegacyPreset::BlockInvites, None).to_record()
    }

    #[tokio::test]
    async fn test_absence_is_cached() {
        let (store, inner) = cached(Duration::from_secs(60));
        assert!(store.get_restriction(10).await.unwrap().is_none());
        assert!(store.get_restriction(10).await.unwrap().is_none());
        assert_eq!(inner.restriction_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_writes_invalidate() {
        let (store, inner) = cached(Duration::from_secs(60));
        assert!(store.get_restriction(10).await.unwrap().is_none());

        store.save_restriction(record(10)).await.unwrap();
        assert!(store.get_restriction(10).await.unwrap().is_some());

        assert!(store.delete_restriction(10).await.unwrap());
        assert!(store.get_restriction(10).await.unwrap().is_none());
        assert_eq!(inner.restriction_reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let (store, inner) = cached(Duration::from_millis(20));
        store.get_restriction(10).await.unwrap();

        // Written behind the cache's back.
        inner.save_restriction(record(10)).await.unwrap();
        assert!(store.get_restriction(10).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get_restriction(10).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bypass_roles_cached_and_invalidated() {
        let (store, inner) = cached(Duration::from_secs(60));
        assert!(store.get_bypass_roles(1).await.unwrap().is_empty());
        assert!(store.get_bypass_roles(1).await.unwrap().is_empty());
        assert_eq!(inner.role_reads.load(Ordering::SeqCst), 1);

        assert!(store.add_bypass_role(1, 500).await.unwrap());
        assert_eq!(store.get_bypass_roles(1).await.unwrap(), HashSet::from([500]));
        assert_eq!(inner.role_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_during_read_does_not_cache_stale_value() {
        let inner = Arc::new(CountingStore::default());
        let store = Arc::new(CachedRestrictionStore::new(
            Arc::clone(&inner),
            Duration::from_secs(60),
        ));
        inner.hold_reads.store(true, Ordering::SeqCst);

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get_restriction(10).await })
        };
        inner.read_started.notified().await;

        // Lands after the read fetched "no restriction" but before it fills.
        store.save_restriction(record(10)).await.unwrap();
        inner.hold_reads.store(false, Ordering::SeqCst);
        inner.release.notify_one();

        assert!(reader.await.unwrap().unwrap().is_none());
        assert!(store.get_restriction(10).await.unwrap().is_some());
    }
}
