// Restriction domain models - channel policies and the messages they judge.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity messages into `IncomingMessage` and
// turns the returned `Action` back into API calls.

use super::content_types::ContentTypes;
use super::presets::LegacyPreset;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// RESTRICTION CONFIG
// ============================================================================

/// Why a set of masks cannot become a restriction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRestriction {
    #[error("cannot allow and block the same content types: {0}")]
    Conflicting(ContentTypes),

    #[error("a restriction needs at least one allowed or blocked content type")]
    Empty,

    #[error("{field} mask {value} contains unknown content type bits")]
    UnknownBits { field: &'static str, value: i64 },
}

/// Validated per-channel policy.
///
/// Fields are private so the only way to get one is through `new`,
/// `from_preset`, or `TryFrom<RestrictionRecord>`, all of which enforce
/// `allowed & blocked == 0` and `allowed | blocked != 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionConfig {
    guild_id: u64,
    channel_id: u64,
    allowed: ContentTypes,
    blocked: ContentTypes,
    redirect_channel_id: Option<u64>,
    preset: Option<LegacyPreset>,
    configured_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RestrictionConfig {
    /// Build a granular (non-preset) restriction.
    pub fn new(
        guild_id: u64,
        channel_id: u64,
        allowed: ContentTypes,
        blocked: ContentTypes,
        redirect_channel_id: Option<u64>,
    ) -> Result<Self, InvalidRestriction> {
        validate_masks(allowed, blocked)?;
        let now = Utc::now();
        Ok(Self {
            guild_id,
            channel_id,
            allowed,
            blocked,
            redirect_channel_id,
            preset: None,
            configured_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Build a restriction pre-filled from a legacy preset.
    pub fn from_preset(
        guild_id: u64,
        channel_id: u64,
        preset: LegacyPreset,
        redirect_channel_id: Option<u64>,
    ) -> Self {
        let (allowed, blocked) = preset.masks();
        let now = Utc::now();
        Self {
            guild_id,
            channel_id,
            allowed,
            blocked,
            redirect_channel_id,
            preset: Some(preset),
            configured_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn configured_by(mut self, user_id: u64) -> Self {
        self.configured_by = Some(user_id);
        self
    }

    /// Produce an edited copy. The preset tag survives only if the new
    /// masks are still exactly the preset's pair.
    pub fn revise(
        &self,
        allowed: ContentTypes,
        blocked: ContentTypes,
        redirect_channel_id: Option<u64>,
    ) -> Result<Self, InvalidRestriction> {
        validate_masks(allowed, blocked)?;
        let preset = self
            .preset
            .filter(|preset| preset.masks() == (allowed, blocked));
        Ok(Self {
            allowed,
            blocked,
            redirect_channel_id,
            preset,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn allowed(&self) -> ContentTypes {
        self.allowed
    }

    pub fn blocked(&self) -> ContentTypes {
        self.blocked
    }

    pub fn redirect_channel_id(&self) -> Option<u64> {
        self.redirect_channel_id
    }

    pub fn preset(&self) -> Option<LegacyPreset> {
        self.preset
    }

    pub fn configured_by_user(&self) -> Option<u64> {
        self.configured_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whitelist mode: anything outside `allowed` is rejected.
    pub fn is_allow_list(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// Display name for the kind of restriction ("custom" for granular ones).
    pub fn kind_name(&self) -> &'static str {
        self.preset.map(LegacyPreset::name).unwrap_or("custom")
    }

    pub fn to_record(&self) -> RestrictionRecord {
        RestrictionRecord {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            allowed_mask: self.allowed.to_db(),
            blocked_mask: self.blocked.to_db(),
            redirect_channel_id: self.redirect_channel_id,
            preset_name: self.preset.map(|p| p.name().to_string()),
            configured_by: self.configured_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn validate_masks(allowed: ContentTypes, blocked: ContentTypes) -> Result<(), InvalidRestriction> {
    let overlap = allowed & blocked;
    if !overlap.is_empty() {
        return Err(InvalidRestriction::Conflicting(overlap));
    }
    if (allowed | blocked).is_empty() {
        return Err(InvalidRestriction::Empty);
    }
    Ok(())
}

/// Raw storage row. Masks are kept as stored integers until validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionRecord {
    pub guild_id: u64,
    pub channel_id: u64,
    pub allowed_mask: i64,
    pub blocked_mask: i64,
    pub redirect_channel_id: Option<u64>,
    pub preset_name: Option<String>,
    pub configured_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RestrictionRecord> for RestrictionConfig {
    type Error = InvalidRestriction;

    fn try_from(record: RestrictionRecord) -> Result<Self, Self::Error> {
        let allowed =
            ContentTypes::from_db(record.allowed_mask).ok_or(InvalidRestriction::UnknownBits {
                field: "allowed",
                value: record.allowed_mask,
            })?;
        let blocked =
            ContentTypes::from_db(record.blocked_mask).ok_or(InvalidRestriction::UnknownBits {
                field: "blocked",
                value: record.blocked_mask,
            })?;
        validate_masks(allowed, blocked)?;

        // The preset tag is display-only; an unrecognised name just reads as custom.
        let preset = record
            .preset_name
            .as_deref()
            .and_then(LegacyPreset::from_name);

        Ok(Self {
            guild_id: record.guild_id,
            channel_id: record.channel_id,
            allowed,
            blocked,
            redirect_channel_id: record.redirect_channel_id,
            preset,
            configured_by: record.configured_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// An uploaded file as declared by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub filename: String,
    /// Declared MIME type, if the gateway sent one
    pub content_type: Option<String>,
}

impl AttachmentInfo {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

/// A newly posted guild message, reduced to what enforcement needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub content: String,
    pub attachments: Vec<AttachmentInfo>,
    pub embed_count: usize,
}

/// Result of classifying one message. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub content: ContentTypes,
    pub author_id: u64,
    pub channel_id: u64,
}

/// What the gateway knows about a message author's standing in the guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorRoles {
    pub role_ids: HashSet<u64>,
    /// Administrator permission or guild ownership
    pub is_administrator: bool,
}

impl AuthorRoles {
    pub fn new(role_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            role_ids: role_ids.into_iter().collect(),
            is_administrator: false,
        }
    }

    pub fn administrator() -> Self {
        Self {
            role_ids: HashSet::new(),
            is_administrator: true,
        }
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

/// Which rule rejected a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A present type is on the block-list
    Blocked,
    /// A present type is outside a non-empty allow-list
    NotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Violation {
        kind: ViolationKind,
        /// The content types that caused the rejection
        offending: ContentTypes,
    },
}

impl Verdict {
    pub fn is_violation(&self) -> bool {
        matches!(self, Verdict::Violation { .. })
    }
}

/// What the coordinator did (or decided not to do) with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Message left alone
    None,
    /// Deleted with no visible notice
    DeleteSilent,
    /// Deleted and the author pointed at another channel
    DeleteAndRedirect { redirect_channel_id: u64 },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::DeleteSilent => write!(f, "delete"),
            Action::DeleteAndRedirect {
                redirect_channel_id,
            } => write!(f, "delete and redirect to {}", redirect_channel_id),
        }
    }
}
