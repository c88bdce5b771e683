// This is the entry point of the channel guard bot.
//
// **Architecture Overview:**
// - `core/` = Classification, policy and enforcement logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory, caching)
// - `discord/` = Discord-specific adapters (commands, events, message sink)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::restrictions::{
    Action, EnforcementCoordinator, EnforcementSettings, RestrictionService,
};
use crate::discord::restrictions::{commands, handler, sink::SerenityMessageSink};
use crate::discord::{Data, Error};
use crate::infra::restrictions::{CachedRestrictionStore, SqliteRestrictionStore};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "data/restrictions.db";

/// Read a numeric environment variable, falling back to `default` when it is
/// missing or unparsable.
fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn enforcement_settings() -> EnforcementSettings {
    let defaults = EnforcementSettings::default();
    EnforcementSettings {
        lookup_timeout: Duration::from_millis(env_u64(
            "CONFIG_LOOKUP_TIMEOUT_MS",
            defaults.lookup_timeout.as_millis() as u64,
        )),
        action_timeout: Duration::from_millis(env_u64(
            "SINK_ACTION_TIMEOUT_MS",
            defaults.action_timeout.as_millis() as u64,
        )),
        notice_ttl: Duration::from_secs(env_u64("NOTICE_TTL_SECS", defaults.notice_ttl.as_secs())),
    }
}

/// Event handler for non-command Discord events.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        match handler::enforce_message(new_message, data.enforcement.as_ref()).await {
            Ok(Action::None) => {}
            Ok(action) => {
                tracing::debug!(
                    message_id = new_message.id.get(),
                    channel_id = new_message.channel_id.get(),
                    %action,
                    "Restriction enforced"
                );
            }
            Err(e) => {
                tracing::error!(
                    message_id = new_message.id.get(),
                    channel_id = new_message.channel_id.get(),
                    "Error enforcing channel restriction: {}",
                    e
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    let db_path = std::env::var("RESTRICTIONS_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let cache_ttl = Duration::from_secs(env_u64("CONFIG_CACHE_TTL_SECS", 30));
    let settings = enforcement_settings();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // One cached SQLite store is shared by authoring and enforcement so a
    // command's write invalidates the entry enforcement reads next.

    let sqlite_store = SqliteRestrictionStore::new(&db_path)
        .await
        .expect("Failed to initialize restrictions database");
    let store = Arc::new(CachedRestrictionStore::new(sqlite_store, cache_ttl));

    let restriction_service = Arc::new(RestrictionService::new(Arc::clone(&store)));

    tracing::info!(
        db_path = %db_path,
        cache_ttl_secs = cache_ttl.as_secs(),
        lookup_timeout_ms = settings.lookup_timeout.as_millis() as u64,
        action_timeout_ms = settings.action_timeout.as_millis() as u64,
        notice_ttl_secs = settings.notice_ttl.as_secs(),
        "Restriction services configured"
    );

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to classify message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS; // Keeps member roles in the cache

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::restrict(), commands::bypass()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // The sink needs the live HTTP client and cache, so enforcement
                // is wired here rather than above.
                let sink = SerenityMessageSink::new(ctx.http.clone(), ctx.cache.clone());
                let enforcement = Arc::new(EnforcementCoordinator::new(
                    Arc::clone(&store),
                    Arc::clone(&store),
                    sink,
                    settings,
                ));

                Ok(Data {
                    restrictions: restriction_service,
                    enforcement,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
