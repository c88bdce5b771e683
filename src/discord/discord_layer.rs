// Discord layer - commands and event handlers.

#[path = "restrictions/mod.rs"]
pub mod restrictions;

use crate::core::restrictions::{EnforcementCoordinator, RestrictionService};
use crate::infra::restrictions::{CachedRestrictionStore, SqliteRestrictionStore};
use restrictions::sink::SerenityMessageSink;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The store shared by the authoring service and the enforcement path.
pub type RestrictionBackend = Arc<CachedRestrictionStore<SqliteRestrictionStore>>;

pub type Enforcement =
    EnforcementCoordinator<RestrictionBackend, RestrictionBackend, SerenityMessageSink>;

/// Shared state available to every command and event handler.
pub struct Data {
    pub restrictions: Arc<RestrictionService<RestrictionBackend>>,
    pub enforcement: Arc<Enforcement>,
}
