// Restriction authoring - the write path behind /restrict and /bypass.
//
// Everything that creates or edits a restriction goes through
// `RestrictionConfig`, so invalid masks never reach the store.

use super::content_types::ContentTypes;
use super::presets::LegacyPreset;
use super::restriction_models::{InvalidRestriction, RestrictionConfig};
use super::restriction_store::{RestrictionStore, StoreError};
use std::collections::HashSet;
use thiserror::Error;

/// Kind reported for stored rows that fail validation.
const MALFORMED_KIND: &str = "malformed";

#[derive(Debug, Error)]
pub enum RestrictionError {
    #[error("Invalid restriction: {0}")]
    Invalid(#[from] InvalidRestriction),

    #[error("Channel <#{channel_id}> already has a `{kind}` restriction")]
    AlreadyRestricted { channel_id: u64, kind: &'static str },

    #[error("Channel <#{0}> has no restriction")]
    NotRestricted(u64),

    #[error("Channel <#{channel_id}> has a `{found}` restriction, not `{expected}`")]
    PresetMismatch {
        channel_id: u64,
        expected: LegacyPreset,
        found: &'static str,
    },

    #[error("Stored restriction for <#{channel_id}> is unreadable: {reason}")]
    Corrupt {
        channel_id: u64,
        reason: InvalidRestriction,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// How `update` treats the redirect channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectChange {
    #[default]
    Keep,
    Set(u64),
    Clear,
}

/// Partial edit of an existing restriction. `None` keeps the current mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestrictionUpdate {
    pub allowed: Option<ContentTypes>,
    pub blocked: Option<ContentTypes>,
    pub redirect: RedirectChange,
}

pub struct RestrictionService<S: RestrictionStore> {
    store: S,
}

impl<S: RestrictionStore> RestrictionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Restrict a channel with one of the legacy presets.
    pub async fn apply_preset(
        &self,
        guild_id: u64,
        channel_id: u64,
        preset: LegacyPreset,
        redirect_channel_id: Option<u64>,
        configured_by: u64,
    ) -> Result<RestrictionConfig, RestrictionError> {
        self.ensure_unrestricted(channel_id).await?;

        let config = RestrictionConfig::from_preset(guild_id, channel_id, preset, redirect_channel_id)
            .configured_by(configured_by);
        self.store.save_restriction(config.to_record()).await?;

        tracing::info!(guild_id, channel_id, preset = %preset, "Applied preset restriction");
        Ok(config)
    }

    /// Restrict a channel with explicit allow/block masks.
    pub async fn create_custom(
        &self,
        guild_id: u64,
        channel_id: u64,
        allowed: ContentTypes,
        blocked: ContentTypes,
        redirect_channel_id: Option<u64>,
        configured_by: u64,
    ) -> Result<RestrictionConfig, RestrictionError> {
        self.ensure_unrestricted(channel_id).await?;

        let config = RestrictionConfig::new(guild_id, channel_id, allowed, blocked, redirect_channel_id)?
            .configured_by(configured_by);
        self.store.save_restriction(config.to_record()).await?;

        tracing::info!(
            guild_id,
            channel_id,
            allowed = %allowed,
            blocked = %blocked,
            "Created custom restriction"
        );
        Ok(config)
    }

    pub async fn update(
        &self,
        guild_id: u64,
        channel_id: u64,
        change: RestrictionUpdate,
    ) -> Result<RestrictionConfig, RestrictionError> {
        let current = self.require(guild_id, channel_id).await?;

        let redirect = match change.redirect {
            RedirectChange::Keep => current.redirect_channel_id(),
            RedirectChange::Set(id) => Some(id),
            RedirectChange::Clear => None,
        };
        let revised = current.revise(
            change.allowed.unwrap_or(current.allowed()),
            change.blocked.unwrap_or(current.blocked()),
            redirect,
        )?;
        self.store.save_restriction(revised.to_record()).await?;

        tracing::info!(
            guild_id,
            channel_id,
            allowed = %revised.allowed(),
            blocked = %revised.blocked(),
            kind = revised.kind_name(),
            "Updated restriction"
        );
        Ok(revised)
    }

    /// Remove a channel's restriction and return the kind that was removed.
    /// With `expected_preset` set, only a restriction created from that
    /// preset is removed. Without it, unreadable rows are cleared as well.
    pub async fn remove(
        &self,
        guild_id: u64,
        channel_id: u64,
        expected_preset: Option<LegacyPreset>,
    ) -> Result<&'static str, RestrictionError> {
        let record = self
            .store
            .get_restriction(channel_id)
            .await?
            .filter(|record| record.guild_id == guild_id)
            .ok_or(RestrictionError::NotRestricted(channel_id))?;

        let kind = match (RestrictionConfig::try_from(record), expected_preset) {
            (Ok(current), Some(expected)) if current.preset() != Some(expected) => {
                return Err(RestrictionError::PresetMismatch {
                    channel_id,
                    expected,
                    found: current.kind_name(),
                });
            }
            (Ok(current), _) => current.kind_name(),
            (Err(reason), Some(_)) => {
                return Err(RestrictionError::Corrupt { channel_id, reason });
            }
            (Err(_), None) => MALFORMED_KIND,
        };

        if !self.store.delete_restriction(channel_id).await? {
            return Err(RestrictionError::NotRestricted(channel_id));
        }

        tracing::info!(guild_id, channel_id, kind, "Removed restriction");
        Ok(kind)
    }

    pub async fn get(&self, channel_id: u64) -> Result<Option<RestrictionConfig>, RestrictionError> {
        match self.store.get_restriction(channel_id).await? {
            Some(record) => RestrictionConfig::try_from(record)
                .map(Some)
                .map_err(|reason| RestrictionError::Corrupt { channel_id, reason }),
            None => Ok(None),
        }
    }

    /// Every readable restriction in a guild, ordered by channel id.
    pub async fn list(&self, guild_id: u64) -> Result<Vec<RestrictionConfig>, RestrictionError> {
        let records = self.store.list_restrictions(guild_id).await?;

        let mut configs: Vec<RestrictionConfig> = records
            .into_iter()
            .filter_map(|record| {
                let channel_id = record.channel_id;
                match RestrictionConfig::try_from(record) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(guild_id, channel_id, error = %e, "Skipping malformed restriction");
                        None
                    }
                }
            })
            .collect();
        configs.sort_by_key(RestrictionConfig::channel_id);
        Ok(configs)
    }

    /// Returns `false` if the role already bypassed restrictions.
    pub async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, RestrictionError> {
        let added = self.store.add_bypass_role(guild_id, role_id).await?;
        if added {
            tracing::info!(guild_id, role_id, "Added bypass role");
        }
        Ok(added)
    }

    pub async fn remove_bypass_role(
        &self,
        guild_id: u64,
        role_id: u64,
    ) -> Result<bool, RestrictionError> {
        let removed = self.store.remove_bypass_role(guild_id, role_id).await?;
        if removed {
            tracing::info!(guild_id, role_id, "Removed bypass role");
        }
        Ok(removed)
    }

    pub async fn list_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, RestrictionError> {
        Ok(self.store.get_bypass_roles(guild_id).await?)
    }

    async fn ensure_unrestricted(&self, channel_id: u64) -> Result<(), RestrictionError> {
        match self.store.get_restriction(channel_id).await? {
            None => Ok(()),
            Some(record) => {
                // A corrupt row still occupies the channel.
                let kind = RestrictionConfig::try_from(record)
                    .map(|config| config.kind_name())
                    .unwrap_or(MALFORMED_KIND);
                Err(RestrictionError::AlreadyRestricted { channel_id, kind })
            }
        }
    }

    /// Load a restriction that must exist in this guild.
    async fn require(&self, guild_id: u64, channel_id: u64) -> Result<RestrictionConfig, RestrictionError> {
        match self.get(channel_id).await? {
            Some(config) if config.guild_id() == guild_id => Ok(config),
            _ => Err(RestrictionError::NotRestricted(channel_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::restrictions::restriction_store::ConfigStore;
    use crate::infra::restrictions::InMemoryRestrictionStore;
    use std::sync::Arc;

    const GUILD: u64 = 1;
    const MOD: u64 = 77;

    fn service() -> (RestrictionService<Arc<InMemoryRestrictionStore>>, Arc<InMemoryRestrictionStore>) {
        let store = Arc::new(InMemoryRestrictionStore::new());
        (RestrictionService::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_apply_preset_persists_masks() {
        let (service, store) = service();
        let config = service
            .apply_preset(GUILD, 10, LegacyPreset::MediaOnly, Some(11), MOD)
            .await
            .unwrap();

        assert_eq!(config.preset(), Some(LegacyPreset::MediaOnly));
        assert_eq!(config.configured_by_user(), Some(MOD));

        let record = store.get_restriction(10).await.unwrap().unwrap();
        assert_eq!(record.allowed_mask, 124);
        assert_eq!(record.blocked_mask, 1);
        assert_eq!(record.preset_name.as_deref(), Some("media_only"));
    }

    #[tokio::test]
    async fn test_second_restriction_is_refused() {
        let (service, _) = service();
        service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap();

        let err = service
            .create_custom(GUILD, 10, ContentTypes::PLAIN_TEXT, ContentTypes::empty(), None, MOD)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestrictionError::AlreadyRestricted {
                channel_id: 10,
                kind: "block_invites"
            }
        ));
    }

    #[tokio::test]
    async fn test_create_custom_validates_masks() {
        let (service, store) = service();
        let err = service
            .create_custom(
                GUILD,
                10,
                ContentTypes::PLAIN_TEXT,
                ContentTypes::PLAIN_TEXT,
                None,
                MOD,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RestrictionError::Invalid(InvalidRestriction::Conflicting(_))));
        assert!(store.get_restriction(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_preset_only_when_masks_match() {
        let (service, _) = service();
        service
            .apply_preset(GUILD, 10, LegacyPreset::TextOnly, None, MOD)
            .await
            .unwrap();

        let redirected = service
            .update(
                GUILD,
                10,
                RestrictionUpdate {
                    redirect: RedirectChange::Set(12),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(redirected.preset(), Some(LegacyPreset::TextOnly));
        assert_eq!(redirected.redirect_channel_id(), Some(12));

        let widened = service
            .update(
                GUILD,
                10,
                RestrictionUpdate {
                    allowed: Some(ContentTypes::PLAIN_TEXT | ContentTypes::REGULAR_LINK),
                    blocked: Some(ContentTypes::empty()),
                    redirect: RedirectChange::Clear,
                },
            )
            .await
            .unwrap();
        assert_eq!(widened.preset(), None);
        assert_eq!(widened.redirect_channel_id(), None);
        assert_eq!(service.get(10).await.unwrap(), Some(widened));
    }

    #[tokio::test]
    async fn test_update_rejects_conflicting_result() {
        let (service, _) = service();
        service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap();

        // allowed already contains PLAIN_TEXT
        let err = service
            .update(
                GUILD,
                10,
                RestrictionUpdate {
                    blocked: Some(ContentTypes::PLAIN_TEXT),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RestrictionError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_update_ignores_other_guilds() {
        let (service, _) = service();
        service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap();

        let err = service
            .update(2, 10, RestrictionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RestrictionError::NotRestricted(10)));
    }

    #[tokio::test]
    async fn test_remove_checks_expected_preset() {
        let (service, _) = service();
        service
            .apply_preset(GUILD, 10, LegacyPreset::BlockAllLinks, None, MOD)
            .await
            .unwrap();

        let err = service
            .remove(GUILD, 10, Some(LegacyPreset::MediaOnly))
            .await
            .unwrap_err();
        assert!(matches!(err, RestrictionError::PresetMismatch { .. }));

        let removed = service
            .remove(GUILD, 10, Some(LegacyPreset::BlockAllLinks))
            .await
            .unwrap();
        assert_eq!(removed, "block_all_links");
        assert!(service.get(10).await.unwrap().is_none());

        let err = service.remove(GUILD, 10, None).await.unwrap_err();
        assert!(matches!(err, RestrictionError::NotRestricted(10)));
    }

    #[tokio::test]
    async fn test_list_skips_malformed_rows() {
        let (service, store) = service();
        service
            .apply_preset(GUILD, 20, LegacyPreset::TextOnly, None, MOD)
            .await
            .unwrap();
        service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap();
        service
            .apply_preset(2, 30, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap();

        let mut broken = store.get_restriction(20).await.unwrap().unwrap();
        broken.channel_id = 15;
        broken.allowed_mask = 3;
        broken.blocked_mask = 1;
        store.save_restriction(broken).await.unwrap();

        let listed: Vec<u64> = service
            .list(GUILD)
            .await
            .unwrap()
            .iter()
            .map(RestrictionConfig::channel_id)
            .collect();
        assert_eq!(listed, vec![10, 20]);

        assert!(matches!(
            service.get(15).await.unwrap_err(),
            RestrictionError::Corrupt { channel_id: 15, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_row_blocks_new_restriction_until_removed() {
        let (service, store) = service();
        let mut broken = RestrictionConfig::from_preset(GUILD, 10, LegacyPreset::TextOnly, None)
            .to_record();
        broken.allowed_mask = 1 << 20;
        store.save_restriction(broken).await.unwrap();

        let err = service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestrictionError::AlreadyRestricted { kind: "malformed", .. }
        ));

        assert!(matches!(
            service.remove(GUILD, 10, Some(LegacyPreset::TextOnly)).await,
            Err(RestrictionError::Corrupt { .. })
        ));
        assert_eq!(service.remove(GUILD, 10, None).await.unwrap(), "malformed");
        assert!(service
            .apply_preset(GUILD, 10, LegacyPreset::BlockInvites, None, MOD)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_bypass_roles_roundtrip() {
        let (service, _) = service();
        assert!(service.add_bypass_role(GUILD, 500).await.unwrap());
        assert!(!service.add_bypass_role(GUILD, 500).await.unwrap());
        assert!(service.add_bypass_role(GUILD, 501).await.unwrap());

        let roles = service.list_bypass_roles(GUILD).await.unwrap();
        assert_eq!(roles, HashSet::from([500, 501]));

        assert!(service.remove_bypass_role(GUILD, 500).await.unwrap());
        assert!(!service.remove_bypass_role(GUILD, 500).await.unwrap());
        assert!(service.list_bypass_roles(2).await.unwrap().is_empty());
    }
}
