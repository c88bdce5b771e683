// Serenity-backed `MessageSink` - the only place enforcement touches the
// Discord API.

use crate::core::restrictions::{AuthorRoles, IncomingMessage, MessageSink, SinkError};
use async_trait::async_trait;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use std::sync::Arc;
use std::time::Duration;

pub struct SerenityMessageSink {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityMessageSink {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    /// Cache-only lookup. The guard is dropped before returning so nothing
    /// borrowed from the cache lives across an await.
    fn roles_from_cache(&self, guild_id: GuildId, user_id: UserId) -> Option<AuthorRoles> {
        let guild = self.cache.guild(guild_id)?;
        let member = guild.members.get(&user_id)?;
        Some(author_roles(
            guild_id,
            guild.owner_id,
            |id| guild.roles.get(&id).map(|role| role.permissions),
            &member.roles,
            user_id,
        ))
    }
}

/// Administrator is guild-wide, so channel overwrites don't matter here.
fn author_roles(
    guild_id: GuildId,
    owner_id: UserId,
    permissions_of: impl Fn(RoleId) -> Option<Permissions>,
    member_roles: &[RoleId],
    user_id: UserId,
) -> AuthorRoles {
    let is_administrator = owner_id == user_id
        || member_roles
            .iter()
            .copied()
            .chain(std::iter::once(guild_id.everyone_role()))
            .filter_map(&permissions_of)
            .any(|permissions| permissions.administrator());

    AuthorRoles {
        role_ids: member_roles.iter().map(|id| id.get()).collect(),
        is_administrator,
    }
}

fn sink_error(e: serenity::Error, permission: &str) -> SinkError {
    if let serenity::Error::Http(http_err) = &e {
        match http_err.status_code().map(|status| status.as_u16()) {
            Some(403) => return SinkError::Forbidden(permission.to_string()),
            Some(404) => return SinkError::NotFound,
            _ => {}
        }
    }
    SinkError::Gateway(e.to_string())
}

#[async_trait]
impl MessageSink for SerenityMessageSink {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), SinkError> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await
            .map_err(|e| sink_error(e, "Manage Messages"))
    }

    async fn send_notice(
        &self,
        channel_id: u64,
        text: &str,
        ttl: Duration,
    ) -> Result<(), SinkError> {
        let notice = ChannelId::new(channel_id)
            .say(&self.http, text)
            .await
            .map_err(|e| sink_error(e, "Send Messages"))?;

        let http = Arc::clone(&self.http);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = notice.delete(&http).await {
                tracing::debug!(channel_id, error = %e, "Failed to clean up redirect notice");
            }
        });

        Ok(())
    }

    async fn get_author_roles(&self, message: &IncomingMessage) -> Result<AuthorRoles, SinkError> {
        let guild_id = GuildId::new(message.guild_id);
        let user_id = UserId::new(message.author_id);

        if let Some(roles) = self.roles_from_cache(guild_id, user_id) {
            return Ok(roles);
        }

        // Cold cache: fall back to two REST calls.
        let member = guild_id
            .member(&self.http, user_id)
            .await
            .map_err(|e| sink_error(e, "View Members"))?;
        let guild = guild_id
            .to_partial_guild(&self.http)
            .await
            .map_err(|e| sink_error(e, "View Server"))?;

        Ok(author_roles(
            guild_id,
            guild.owner_id,
            |id| guild.roles.get(&id).map(|role| role.permissions),
            &member.roles,
            user_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(list: &[(u64, Permissions)]) -> impl Fn(RoleId) -> Option<Permissions> {
        let map: HashMap<RoleId, Permissions> =
            list.iter().map(|(id, p)| (RoleId::new(*id), *p)).collect();
        move |id| map.get(&id).copied()
    }

    #[test]
    fn test_owner_is_administrator() {
        let guild = GuildId::new(1);
        let roles = author_roles(guild, UserId::new(5), lookup(&[]), &[], UserId::new(5));
        assert!(roles.is_administrator);
    }

    #[test]
    fn test_admin_role_grants_administrator() {
        let guild = GuildId::new(1);
        let table = [
            (1, Permissions::SEND_MESSAGES),
            (10, Permissions::ADMINISTRATOR),
            (11, Permissions::MANAGE_MESSAGES),
        ];

        let admin = author_roles(
            guild,
            UserId::new(99),
            lookup(&table),
            &[RoleId::new(10)],
            UserId::new(5),
        );
        assert!(admin.is_administrator);

        let moderator = author_roles(
            guild,
            UserId::new(99),
            lookup(&table),
            &[RoleId::new(11)],
            UserId::new(5),
        );
        assert!(!moderator.is_administrator);
        assert_eq!(moderator.role_ids, [11].into_iter().collect());
    }

    #[test]
    fn test_everyone_role_counts() {
        let guild = GuildId::new(1);
        let roles = author_roles(
            guild,
            UserId::new(99),
            lookup(&[(1, Permissions::ADMINISTRATOR)]),
            &[],
            UserId::new(5),
        );
        assert!(roles.is_administrator);
    }
}
