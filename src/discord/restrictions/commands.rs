// Restriction slash commands: /restrict and /bypass.

use crate::core::restrictions::{
    ContentTypeCatalog, ContentTypes, LegacyPreset, RedirectChange, RestrictionConfig,
    RestrictionError, RestrictionUpdate,
};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Embed descriptions are capped at 4096 characters.
const DESCRIPTION_LIMIT: usize = 4000;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PresetChoice {
    #[name = "Block Discord invites"]
    BlockInvites,
    #[name = "Block all links"]
    BlockAllLinks,
    #[name = "Media only"]
    MediaOnly,
    #[name = "Text only"]
    TextOnly,
}

impl From<PresetChoice> for LegacyPreset {
    fn from(choice: PresetChoice) -> Self {
        match choice {
            PresetChoice::BlockInvites => LegacyPreset::BlockInvites,
            PresetChoice::BlockAllLinks => LegacyPreset::BlockAllLinks,
            PresetChoice::MediaOnly => LegacyPreset::MediaOnly,
            PresetChoice::TextOnly => LegacyPreset::TextOnly,
        }
    }
}

/// Parse a comma-separated content type list. "none" clears the mask.
fn parse_mask(input: Option<&str>) -> Result<Option<ContentTypes>, String> {
    let Some(input) = input.map(str::trim) else {
        return Ok(None);
    };
    if input.eq_ignore_ascii_case("none") {
        return Ok(Some(ContentTypes::empty()));
    }
    ContentTypes::parse_list(input)
        .map(Some)
        .map_err(|unknown| {
            format!(
                "Unknown content type `{}`. Use `/restrict types` to see the options.",
                unknown
            )
        })
}

fn channel_mention(id: Option<u64>) -> String {
    id.map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "None (silent delete)".to_string())
}

fn restriction_embed(title: &str, config: &RestrictionConfig) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(title)
        .color(serenity::Color::ORANGE)
        .field("Channel", format!("<#{}>", config.channel_id()), true)
        .field("Kind", format!("`{}`", config.kind_name()), true)
        .field("Redirect", channel_mention(config.redirect_channel_id()), true)
        .field(
            "Mode",
            if config.is_allow_list() {
                "Allow-list: anything not allowed is removed"
            } else {
                "Block-list: only blocked content is removed"
            },
            false,
        )
        .field("Allowed", config.allowed().describe(), false)
        .field("Blocked", config.blocked().describe(), false);

    if let Some(preset) = config.preset() {
        embed = embed.description(format!("Preset: {}.", preset.summary()));
    }
    if let Some(user_id) = config.configured_by_user() {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Configured by user {}",
            user_id
        )));
    }
    match serenity::Timestamp::from_unix_timestamp(config.updated_at().timestamp()) {
        Ok(updated) => embed.timestamp(updated),
        Err(_) => embed,
    }
}

/// Reply with user-facing errors; storage failures propagate to the framework.
async fn report<T>(ctx: Context<'_>, result: Result<T, RestrictionError>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RestrictionError::Store(e)) => Err(e.into()),
        Err(e) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", e))
                    .ephemeral(true),
            )
            .await?;
            Ok(None)
        }
    }
}

async fn say_ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Validate the target/redirect pair shared by the authoring commands.
fn redirect_target(channel_id: u64, redirect: Option<u64>) -> Result<Option<u64>, String> {
    match redirect {
        Some(redirect_id) if redirect_id == channel_id => {
            Err("The redirect channel must be different from the restricted channel.".to_string())
        }
        other => Ok(other),
    }
}

// ============================================================================
// /restrict
// ============================================================================

/// Restrict what kind of content can be posted in a channel.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_CHANNELS",
    subcommands("preset", "custom", "update", "remove", "list", "show", "types", "stats")
)]
pub async fn restrict(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Apply a preset restriction to a channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn preset(
    ctx: Context<'_>,
    #[description = "Channel to restrict"] channel: serenity::Channel,
    #[description = "Preset to apply"] preset: PresetChoice,
    #[description = "Where to point people whose messages get removed"] redirect: Option<
        serenity::Channel,
    >,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id().get();
    let redirect = match redirect_target(channel_id, redirect.map(|c| c.id().get())) {
        Ok(redirect) => redirect,
        Err(msg) => return say_ephemeral(ctx, format!("❌ {}", msg)).await,
    };

    let result = ctx
        .data()
        .restrictions
        .apply_preset(guild_id, channel_id, preset.into(), redirect, ctx.author().id.get())
        .await;

    if let Some(config) = report(ctx, result).await? {
        let embed = restriction_embed("✅ Channel restricted", &config);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
    }
    Ok(())
}

/// Restrict a channel with your own allow and block lists.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn custom(
    ctx: Context<'_>,
    #[description = "Channel to restrict"] channel: serenity::Channel,
    #[description = "Only these types are allowed (comma-separated, e.g. text, links)"]
    allowed: Option<String>,
    #[description = "These types are always removed (comma-separated)"] blocked: Option<String>,
    #[description = "Where to point people whose messages get removed"] redirect: Option<
        serenity::Channel,
    >,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id().get();

    let parsed = parse_mask(allowed.as_deref()).and_then(|allowed| {
        let blocked = parse_mask(blocked.as_deref())?;
        let redirect = redirect_target(channel_id, redirect.map(|c| c.id().get()))?;
        Ok((allowed, blocked, redirect))
    });
    let (allowed, blocked, redirect) = match parsed {
        Ok(parsed) => parsed,
        Err(msg) => return say_ephemeral(ctx, format!("❌ {}", msg)).await,
    };

    let result = ctx
        .data()
        .restrictions
        .create_custom(
            guild_id,
            channel_id,
            allowed.unwrap_or_default(),
            blocked.unwrap_or_default(),
            redirect,
            ctx.author().id.get(),
        )
        .await;

    if let Some(config) = report(ctx, result).await? {
        let embed = restriction_embed("✅ Channel restricted", &config);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
    }
    Ok(())
}

/// Change an existing restriction. Omitted options stay as they are.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn update(
    ctx: Context<'_>,
    #[description = "Restricted channel"] channel: serenity::Channel,
    #[description = "New allow list (comma-separated, or none)"] allowed: Option<String>,
    #[description = "New block list (comma-separated, or none)"] blocked: Option<String>,
    #[description = "New redirect channel"] redirect: Option<serenity::Channel>,
    #[description = "Remove the redirect and delete silently"] clear_redirect: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id().get();

    let parsed = parse_mask(allowed.as_deref()).and_then(|allowed| {
        let blocked = parse_mask(blocked.as_deref())?;
        let redirect = match redirect_target(channel_id, redirect.map(|c| c.id().get()))? {
            Some(id) => RedirectChange::Set(id),
            None if clear_redirect.unwrap_or(false) => RedirectChange::Clear,
            None => RedirectChange::Keep,
        };
        Ok(RestrictionUpdate {
            allowed,
            blocked,
            redirect,
        })
    });
    let change = match parsed {
        Ok(change) => change,
        Err(msg) => return say_ephemeral(ctx, format!("❌ {}", msg)).await,
    };

    let result = ctx
        .data()
        .restrictions
        .update(guild_id, channel_id, change)
        .await;

    if let Some(config) = report(ctx, result).await? {
        let embed = restriction_embed("✏️ Restriction updated", &config);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
    }
    Ok(())
}

/// Remove a channel's restriction.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Restricted channel"] channel: serenity::Channel,
    #[description = "Only remove it if it was created from this preset"] preset: Option<
        PresetChoice,
    >,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id().get();

    let result = ctx
        .data()
        .restrictions
        .remove(guild_id, channel_id, preset.map(LegacyPreset::from))
        .await;

    if let Some(kind) = report(ctx, result).await? {
        ctx.say(format!(
            "✅ Removed the `{}` restriction from <#{}>.",
            kind, channel_id
        ))
        .await?;
    }
    Ok(())
}

/// List every restricted channel in this server.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let configs = ctx.data().restrictions.list(guild_id).await?;

    if configs.is_empty() {
        ctx.say("No channels are restricted in this server.").await?;
        return Ok(());
    }

    let mut description = String::new();
    for config in &configs {
        let line = format!(
            "<#{}> • `{}` • redirect: {}\n",
            config.channel_id(),
            config.kind_name(),
            channel_mention(config.redirect_channel_id())
        );
        if description.len() + line.len() > DESCRIPTION_LIMIT {
            description.push_str("…");
            break;
        }
        description.push_str(&line);
    }

    let embed = serenity::CreateEmbed::new()
        .title("🔒 Restricted Channels")
        .color(serenity::Color::ORANGE)
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} channel{}",
            configs.len(),
            if configs.len() == 1 { "" } else { "s" }
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the restriction on a channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Channel to inspect"] channel: serenity::Channel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let channel_id = channel.id().get();

    let result = ctx.data().restrictions.get(channel_id).await;
    match report(ctx, result).await? {
        Some(Some(config)) if config.guild_id() == guild_id => {
            let embed = restriction_embed("🔒 Channel Restriction", &config);
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
        }
        Some(_) => {
            ctx.say(format!("<#{}> has no restriction.", channel_id))
                .await?;
        }
        None => {}
    }
    Ok(())
}

/// List the content types you can use in allow and block lists.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn types(ctx: Context<'_>) -> Result<(), Error> {
    let lines: Vec<String> = ContentTypeCatalog::entries()
        .iter()
        .map(|entry| {
            let mut names = vec![format!("`{}`", entry.key)];
            names.extend(entry.aliases.iter().map(|alias| format!("`{}`", alias)));
            format!("**{}**: {}", entry.label, names.join(", "))
        })
        .collect();

    let embed = serenity::CreateEmbed::new()
        .title("📋 Content Types")
        .color(serenity::Color::BLURPLE)
        .description(lines.join("\n"))
        .field(
            "Presets",
            LegacyPreset::ALL
                .iter()
                .map(|p| format!("`{}`: {}", p, p.summary()))
                .collect::<Vec<_>>()
                .join("\n"),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show enforcement counters since the bot started.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let m = ctx.data().enforcement.metrics();

    let embed = serenity::CreateEmbed::new()
        .title("📊 Restriction Enforcement")
        .color(serenity::Color::BLURPLE)
        .field(
            "Messages",
            format!(
                "Checked: {}\nExempt: {}\nPermitted: {}\nViolations: {}",
                m.checked, m.exempt, m.permitted, m.violations
            ),
            true,
        )
        .field(
            "Actions",
            format!(
                "Silent deletes: {}\nRedirects: {}",
                m.silent_deletions, m.redirects
            ),
            true,
        )
        .field(
            "Problems",
            format!(
                "Lookup failures: {}\nLookup timeouts: {}\nBypass failures: {}\nMalformed configs: {}\nAction failures: {}",
                m.lookup_failures,
                m.lookup_timeouts,
                m.bypass_failures,
                m.malformed_configs,
                m.sink_failures
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(
            "Counters cover all servers and reset on restart",
        ));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

// ============================================================================
// /bypass
// ============================================================================

/// Manage roles that ignore every channel restriction.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("bypass_add", "bypass_remove", "bypass_list")
)]
pub async fn bypass(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Let a role post anything in restricted channels.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    rename = "add"
)]
pub async fn bypass_add(
    ctx: Context<'_>,
    #[description = "Role to exempt"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    if ctx
        .data()
        .restrictions
        .add_bypass_role(guild_id, role.id.get())
        .await?
    {
        ctx.say(format!("✅ <@&{}> now bypasses channel restrictions.", role.id))
            .await?;
    } else {
        say_ephemeral(ctx, format!("<@&{}> already bypasses restrictions.", role.id)).await?;
    }
    Ok(())
}

/// Stop a role from bypassing restrictions.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    rename = "remove"
)]
pub async fn bypass_remove(
    ctx: Context<'_>,
    #[description = "Role to remove"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    if ctx
        .data()
        .restrictions
        .remove_bypass_role(guild_id, role.id.get())
        .await?
    {
        ctx.say(format!("✅ <@&{}> no longer bypasses restrictions.", role.id))
            .await?;
    } else {
        say_ephemeral(ctx, format!("<@&{}> was not a bypass role.", role.id)).await?;
    }
    Ok(())
}

/// List roles that bypass restrictions.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    rename = "list"
)]
pub async fn bypass_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let mut roles: Vec<u64> = ctx
        .data()
        .restrictions
        .list_bypass_roles(guild_id)
        .await?
        .into_iter()
        .collect();
    roles.sort_unstable();

    let description = if roles.is_empty() {
        "No bypass roles. Administrators always bypass restrictions.".to_string()
    } else {
        roles
            .iter()
            .map(|id| format!("• <@&{}>", id))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Bypass Roles")
        .color(serenity::Color::BLURPLE)
        .description(description);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask(None), Ok(None));
        assert_eq!(parse_mask(Some(" None ")), Ok(Some(ContentTypes::empty())));
        assert_eq!(
            parse_mask(Some("text, links")),
            Ok(Some(ContentTypes::PLAIN_TEXT | ContentTypes::REGULAR_LINK))
        );
        assert!(parse_mask(Some("text, gifs"))
            .unwrap_err()
            .contains("`gifs`"));
    }

    #[test]
    fn test_redirect_must_differ_from_target() {
        assert_eq!(redirect_target(10, None), Ok(None));
        assert_eq!(redirect_target(10, Some(11)), Ok(Some(11)));
        assert!(redirect_target(10, Some(10)).is_err());
    }

    #[test]
    fn test_preset_choice_maps_to_preset() {
        assert_eq!(
            LegacyPreset::from(PresetChoice::MediaOnly).masks(),
            LegacyPreset::MediaOnly.masks()
        );
        assert_eq!(
            LegacyPreset::from(PresetChoice::BlockAllLinks),
            LegacyPreset::BlockAllLinks
        );
    }
}
