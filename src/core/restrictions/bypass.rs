// Bypass resolution - decides whether a message author is exempt.

use super::restriction_models::AuthorRoles;
use super::restriction_store::{BypassRoleStore, StoreError};
use std::collections::HashSet;

pub struct BypassResolver<B: BypassRoleStore> {
    store: B,
}

impl<B: BypassRoleStore> BypassResolver<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }

    /// Administrators and owners are exempt without touching the store.
    /// Everyone else is exempt if they hold one of the guild's bypass roles.
    pub async fn is_exempt(&self, guild_id: u64, actor: &AuthorRoles) -> Result<bool, StoreError> {
        if actor.is_administrator {
            return Ok(true);
        }
        if actor.role_ids.is_empty() {
            return Ok(false);
        }

        let bypass_roles = self.store.get_bypass_roles(guild_id).await?;
        Ok(holds_bypass_role(actor, &bypass_roles))
    }
}

pub fn holds_bypass_role(actor: &AuthorRoles, bypass_roles: &HashSet<u64>) -> bool {
    !actor.role_ids.is_disjoint(bypass_roles)
}
