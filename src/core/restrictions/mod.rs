// Core restrictions module - content classification and channel policy
// enforcement. Nothing in here knows about serenity.

pub mod bypass;
pub mod classifier;
pub mod content_types;
pub mod enforcement;
pub mod policy;
pub mod presets;
pub mod restriction_models;
pub mod restriction_service;
pub mod restriction_store;

pub use content_types::{ContentTypeCatalog, ContentTypes};
pub use enforcement::*;
pub use presets::LegacyPreset;
pub use restriction_models::*;
pub use restriction_service::*;
pub use restriction_store::*;
