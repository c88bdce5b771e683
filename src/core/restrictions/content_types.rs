// Content type flags - the fixed catalog of things a message can contain.
//
// Every restriction is expressed as a pair of these masks, so the bit values
// are part of the storage format and must never be renumbered.

use bitflags::bitflags;

bitflags! {
    /// Bitmask of content categories present in (or permitted for) a message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContentTypes: u32 {
        /// Text left over once every link has been removed
        const PLAIN_TEXT       = 1 << 0;
        /// discord.gg / discord.com/invite links
        const DISCORD_INVITE   = 1 << 1;
        /// Links pointing straight at an image file
        const IMAGE_LINK       = 1 << 2;
        /// Any other http(s) link
        const REGULAR_LINK     = 1 << 3;
        /// Uploaded file declared as an image
        const IMAGE_ATTACHMENT = 1 << 4;
        /// Uploaded file of any other kind
        const FILE_ATTACHMENT  = 1 << 5;
        /// Rich embeds (link previews or bot payloads)
        const EMBED            = 1 << 6;
    }
}

impl ContentTypes {
    /// Convert a stored mask. Unknown bits are rejected rather than dropped,
    /// since they mean the row was written by something we don't understand.
    pub fn from_db(value: i64) -> Option<Self> {
        u32::try_from(value).ok().and_then(Self::from_bits)
    }

    pub const fn to_db(self) -> i64 {
        self.bits() as i64
    }

    /// Human-readable labels for every flag in this mask, in bit order.
    pub fn labels(self) -> Vec<&'static str> {
        ContentTypeCatalog::entries()
            .iter()
            .filter(|entry| self.contains(entry.flag))
            .map(|entry| entry.label)
            .collect()
    }

    /// Labels joined for display, e.g. "plain text, regular links".
    pub fn describe(self) -> String {
        if self.is_empty() {
            return "nothing".to_string();
        }
        self.labels().join(", ")
    }

    /// Parse a comma-separated list of catalog keys or labels.
    pub fn parse_list(input: &str) -> Result<Self, String> {
        let mut mask = Self::empty();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let flag = ContentTypeCatalog::lookup(part).ok_or_else(|| part.to_string())?;
            mask |= flag;
        }
        Ok(mask)
    }
}

impl std::fmt::Display for ContentTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// One row of the catalog.
#[derive(Debug, Clone, Copy)]
pub struct ContentTypeEntry {
    pub flag: ContentTypes,
    /// Stable machine name used by commands
    pub key: &'static str,
    /// Label shown to users
    pub label: &'static str,
    /// Extra spellings accepted when parsing
    pub aliases: &'static [&'static str],
}

const CATALOG: [ContentTypeEntry; 7] = [
    ContentTypeEntry {
        flag: ContentTypes::PLAIN_TEXT,
        key: "plain_text",
        label: "plain text",
        aliases: &["text"],
    },
    ContentTypeEntry {
        flag: ContentTypes::DISCORD_INVITE,
        key: "discord_invite",
        label: "discord invites",
        aliases: &["invite", "invites"],
    },
    ContentTypeEntry {
        flag: ContentTypes::IMAGE_LINK,
        key: "image_link",
        label: "image links",
        aliases: &["image_links"],
    },
    ContentTypeEntry {
        flag: ContentTypes::REGULAR_LINK,
        key: "regular_link",
        label: "regular links",
        aliases: &["link", "links"],
    },
    ContentTypeEntry {
        flag: ContentTypes::IMAGE_ATTACHMENT,
        key: "image_attachment",
        label: "image attachments",
        aliases: &["image", "images"],
    },
    ContentTypeEntry {
        flag: ContentTypes::FILE_ATTACHMENT,
        key: "file_attachment",
        label: "file attachments",
        aliases: &["file", "files"],
    },
    ContentTypeEntry {
        flag: ContentTypes::EMBED,
        key: "embed",
        label: "embeds",
        aliases: &["embeds"],
    },
];

// Each catalog flag is a single bit, no two overlap, and together they
// cover exactly the declared flag set.
const _: () = {
    let mut union = 0u32;
    let mut i = 0;
    while i < CATALOG.len() {
        let bits = CATALOG[i].flag.bits();
        assert!(bits.count_ones() == 1);
        assert!(union & bits == 0);
        union |= bits;
        i += 1;
    }
    assert!(union == ContentTypes::all().bits());
};

/// Lookup table over every content type the classifier knows about.
pub struct ContentTypeCatalog;

impl ContentTypeCatalog {
    pub fn entries() -> &'static [ContentTypeEntry] {
        &CATALOG
    }

    /// Find a flag by key, label or alias (case-insensitive).
    pub fn lookup(name: &str) -> Option<ContentTypes> {
        let wanted = name.trim().to_lowercase().replace([' ', '-'], "_");
        CATALOG
            .iter()
            .find(|entry| {
                entry.key == wanted
                    || entry.label.replace(' ', "_") == wanted
                    || entry.aliases.contains(&wanted.as_str())
            })
            .map(|entry| entry.flag)
    }
}
