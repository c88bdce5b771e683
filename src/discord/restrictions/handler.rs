// Message-create handling - converts serenity messages for the coordinator.

use crate::core::restrictions::{
    Action, AttachmentInfo, BypassRoleStore, ConfigStore, EnforcementCoordinator, IncomingMessage,
    MessageSink,
};
use crate::discord::Error;
use poise::serenity_prelude as serenity;

/// Run a new message through channel restrictions.
///
/// Bot and DM messages are never restricted.
pub async fn enforce_message<C, B, K>(
    msg: &serenity::Message,
    coordinator: &EnforcementCoordinator<C, B, K>,
) -> Result<Action, Error>
where
    C: ConfigStore,
    B: BypassRoleStore,
    K: MessageSink,
{
    if msg.author.bot {
        return Ok(Action::None);
    }

    let Some(incoming) = to_incoming(msg) else {
        return Ok(Action::None);
    };

    Ok(coordinator.handle(&incoming).await?)
}

/// `None` for messages outside a guild.
pub fn to_incoming(msg: &serenity::Message) -> Option<IncomingMessage> {
    let guild_id = msg.guild_id?;

    Some(IncomingMessage {
        message_id: msg.id.get(),
        guild_id: guild_id.get(),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| AttachmentInfo {
                filename: a.filename.clone(),
                content_type: a.content_type.clone(),
            })
            .collect(),
        embed_count: msg.embeds.len(),
    })
}
