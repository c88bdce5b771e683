// Storage traits (ports) for restrictions and bypass roles.
//
// The core defines what it needs; `infra/restrictions` provides SQLite,
// in-memory and cached implementations. Reads are split from writes so the
// enforcement path only ever sees the read side.

use super::restriction_models::RestrictionRecord;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read side used on every message. Must be cheap to call; implementations
/// are indexed by channel id and usually sit behind a cache.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_restriction(&self, channel_id: u64)
        -> Result<Option<RestrictionRecord>, StoreError>;
}

/// Roles whose holders ignore every restriction in a guild.
#[async_trait]
pub trait BypassRoleStore: Send + Sync {
    async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError>;

    /// Returns `false` if the role was already present.
    async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError>;

    /// Returns `false` if the role was not configured.
    async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError>;
}

/// Write side used by the authoring commands.
#[async_trait]
pub trait RestrictionStore: ConfigStore + BypassRoleStore {
    /// Insert or replace the restriction for `record.channel_id`.
    async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError>;

    /// Returns `false` if the channel had no restriction.
    async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError>;

    async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError>;
}

// Shared stores: the coordinator and the authoring service hold the same
// `Arc` in production.

#[async_trait]
impl<T: ConfigStore + ?Sized> ConfigStore for Arc<T> {
    async fn get_restriction(
        &self,
        channel_id: u64,
    ) -> Result<Option<RestrictionRecord>, StoreError> {
        (**self).get_restriction(channel_id).await
    }
}

#[async_trait]
impl<T: BypassRoleStore + ?Sized> BypassRoleStore for Arc<T> {
    async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError> {
        (**self).get_bypass_roles(guild_id).await
    }

    async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        (**self).add_bypass_role(guild_id, role_id).await
    }

    async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        (**self).remove_bypass_role(guild_id, role_id).await
    }
}

#[async_trait]
impl<T: RestrictionStore + ?Sized> RestrictionStore for Arc<T> {
    async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError> {
        (**self).save_restriction(record).await
    }

    async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError> {
        (**self).delete_restriction(channel_id).await
    }

    async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError> {
        (**self).list_restrictions(guild_id).await
    }
}
