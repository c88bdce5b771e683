// In-memory restriction store, for tests and running without a database.

use crate::core::restrictions::{
    BypassRoleStore, ConfigStore, RestrictionRecord, RestrictionStore, StoreError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
pub struct InMemoryRestrictionStore {
    /// channel_id -> restriction
    restrictions: DashMap<u64, RestrictionRecord>,
    /// guild_id -> bypass role ids
    bypass_roles: DashMap<u64, HashSet<u64>>,
}

impl InMemoryRestrictionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryRestrictionStore {
    async fn get_restriction(
        &self,
        channel_id: u64,
    ) -> Result<Option<RestrictionRecord>, StoreError> {
        Ok(self.restrictions.get(&channel_id).map(|r| r.clone()))
    }
}

#[async_trait]
impl BypassRoleStore for InMemoryRestrictionStore {
    async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError> {
        Ok(self
            .bypass_roles
            .get(&guild_id)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }

    async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        Ok(self.bypass_roles.entry(guild_id).or_default().insert(role_id))
    }

    async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        Ok(self
            .bypass_roles
            .get_mut(&guild_id)
            .map(|mut roles| roles.remove(&role_id))
            .unwrap_or(false))
    }
}

#[async_trait]
impl RestrictionStore for InMemoryRestrictionStore {
    async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError> {
        self.restrictions.insert(record.channel_id, record);
        Ok(())
    }

    async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError> {
        Ok(self.restrictions.remove(&channel_id).is_some())
    }

    async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError> {
        let mut records: Vec<RestrictionRecord> = self
            .restrictions
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.channel_id);
        Ok(records)
    }
}
