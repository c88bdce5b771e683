// Legacy presets - named shortcuts that pre-fill a restriction's masks.
//
// Presets only matter when a restriction is authored. The evaluator never
// sees them; it works on the resulting masks alone.

use super::content_types::ContentTypes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyPreset {
    /// Silently drop Discord invite links
    BlockInvites,
    /// Silently drop every kind of link
    BlockAllLinks,
    /// Media and links only, no bare text
    MediaOnly,
    /// Text (and regular links) only, no media
    TextOnly,
}

impl LegacyPreset {
    pub const ALL: [LegacyPreset; 4] = [
        LegacyPreset::BlockInvites,
        LegacyPreset::BlockAllLinks,
        LegacyPreset::MediaOnly,
        LegacyPreset::TextOnly,
    ];

    /// Canonical `(allowed, blocked)` masks for this preset.
    pub const fn masks(self) -> (ContentTypes, ContentTypes) {
        let (allowed, blocked) = match self {
            LegacyPreset::BlockInvites => (125, 2),
            LegacyPreset::BlockAllLinks => (49, 14),
            LegacyPreset::MediaOnly => (124, 1),
            LegacyPreset::TextOnly => (9, 118),
        };
        (
            ContentTypes::from_bits_truncate(allowed),
            ContentTypes::from_bits_truncate(blocked),
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            LegacyPreset::BlockInvites => "block_invites",
            LegacyPreset::BlockAllLinks => "block_all_links",
            LegacyPreset::MediaOnly => "media_only",
            LegacyPreset::TextOnly => "text_only",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    /// Short description used in command replies.
    pub fn summary(self) -> &'static str {
        match self {
            LegacyPreset::BlockInvites => "Discord invite links are deleted",
            LegacyPreset::BlockAllLinks => "all links are deleted",
            LegacyPreset::MediaOnly => "only media and links are allowed",
            LegacyPreset::TextOnly => "only plain text is allowed",
        }
    }
}

impl std::fmt::Display for LegacyPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table_values() {
        let table: Vec<(&str, u32, u32)> = LegacyPreset::ALL
            .iter()
            .map(|p| {
                let (allowed, blocked) = p.masks();
                (p.name(), allowed.bits(), blocked.bits())
            })
            .collect();

        assert_eq!(
            table,
            vec![
                ("block_invites", 125, 2),
                ("block_all_links", 49, 14),
                ("media_only", 124, 1),
                ("text_only", 9, 118),
            ]
        );
    }

    #[test]
    fn test_presets_are_disjoint() {
        for preset in LegacyPreset::ALL {
            let (allowed, blocked) = preset.masks();
            assert!((allowed & blocked).is_empty(), "{preset} overlaps");
            assert!(!(allowed | blocked).is_empty());
        }
    }

    #[test]
    fn test_block_all_links_leaves_embeds_unlisted() {
        // Embeds are outside both masks, but the allow-list is closed so
        // they are still rejected at evaluation time.
        let (allowed, blocked) = LegacyPreset::BlockAllLinks.masks();
        assert!(!allowed.contains(ContentTypes::EMBED));
        assert!(!blocked.contains(ContentTypes::EMBED));
    }

    #[test]
    fn test_from_name_roundtrip() {
        for preset in LegacyPreset::ALL {
            assert_eq!(LegacyPreset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(LegacyPreset::from_name("custom"), None);
    }
}
