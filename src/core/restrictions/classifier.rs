// Content classifier - turns a message into a `ContentTypes` mask.
//
// Each rule runs independently and a message usually sets several bits.
// Links are matched first so the plain-text rule can look at whatever is
// left once they are cut out.

use super::content_types::ContentTypes;
use super::restriction_models::{AttachmentInfo, ClassifiedMessage, IncomingMessage};
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Invite links, with or without scheme. Angle brackets are Discord's
/// embed-suppression syntax and belong to the link.
///
/// The link must start the message or follow whitespace or `(`, so the
/// invite host can't be the tail of another domain or sit inside another
/// link's path or query. Group 1 is the link itself.
static INVITE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s(])(<?(?:https?://)?(?:www\.)?(?:discord(?:app)?\.com/invite|discord\.gg)/[a-z0-9-]+>?)",
    )
    .expect("valid invite regex")
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<?https?://[^\s<>]+>?").expect("valid url regex"));

const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp"];

/// Punctuation that usually ends a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"'];

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentClassifier;

impl ContentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &IncomingMessage) -> ClassifiedMessage {
        ClassifiedMessage {
            content: self.detect(&message.content, &message.attachments, message.embed_count),
            author_id: message.author_id,
            channel_id: message.channel_id,
        }
    }

    /// Bitwise OR of every content type present.
    pub fn detect(
        &self,
        text: &str,
        attachments: &[AttachmentInfo],
        embed_count: usize,
    ) -> ContentTypes {
        let mut detected = self.detect_text(text);

        if attachments.iter().any(AttachmentInfo::is_image) {
            detected |= ContentTypes::IMAGE_ATTACHMENT;
        }
        if attachments.iter().any(|a| !a.is_image()) {
            detected |= ContentTypes::FILE_ATTACHMENT;
        }
        if embed_count > 0 {
            detected |= ContentTypes::EMBED;
        }

        detected
    }

    fn detect_text(&self, text: &str) -> ContentTypes {
        let mut detected = ContentTypes::empty();
        let mut link_spans: Vec<Range<usize>> = Vec::new();

        for invite in INVITE_PATTERN
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
        {
            detected |= ContentTypes::DISCORD_INVITE;
            link_spans.push(invite.range());
        }

        for url in URL_PATTERN.find_iter(text) {
            let span = url.range();
            let is_invite = link_spans
                .iter()
                .any(|s| s.start < span.end && span.start < s.end);
            if !is_invite {
                detected |= classify_url(url.as_str());
            }
            link_spans.push(span);
        }

        let has_text = text
            .char_indices()
            .filter(|(i, _)| !link_spans.iter().any(|s| s.contains(i)))
            .any(|(_, c)| !c.is_whitespace());
        if has_text {
            detected |= ContentTypes::PLAIN_TEXT;
        }

        detected
    }
}

/// Image link if the path ends in a known image extension, otherwise a
/// regular link. Anything we can't parse confidently is a regular link.
fn classify_url(raw: &str) -> ContentTypes {
    let url = raw
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches(TRAILING_PUNCTUATION);

    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => return ContentTypes::REGULAR_LINK,
    };
    let before_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = match before_query.split_once('/') {
        Some((_host, path)) => path.to_ascii_lowercase(),
        None => return ContentTypes::REGULAR_LINK,
    };

    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        ContentTypes::IMAGE_LINK
    } else {
        ContentTypes::REGULAR_LINK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> ContentTypes {
        ContentClassifier::new().detect(content, &[], 0)
    }

    fn attachment(name: &str, content_type: Option<&str>) -> AttachmentInfo {
        AttachmentInfo {
            filename: name.to_string(),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_message_has_no_content() {
        assert_eq!(text(""), ContentTypes::empty());
        assert_eq!(text("   \n\t "), ContentTypes::empty());
    }

    #[test]
    fn test_plain_text_only() {
        assert_eq!(text("hello there"), ContentTypes::PLAIN_TEXT);
    }

    #[test]
    fn test_invite_without_scheme() {
        let mask = text("join my server at discord.gg/abc123");
        assert!(mask.contains(ContentTypes::DISCORD_INVITE));
        assert!(!mask.intersects(ContentTypes::REGULAR_LINK | ContentTypes::IMAGE_LINK));
    }

    #[test]
    fn test_invite_forms() {
        for invite in [
            "discord.gg/abc123",
            "https://discord.gg/abc123",
            "https://www.discord.com/invite/Abc-123",
            "http://discordapp.com/invite/xyz",
            "<https://discord.gg/abc123>",
        ] {
            assert_eq!(text(invite), ContentTypes::DISCORD_INVITE, "{invite}");
        }
    }

    #[test]
    fn test_lookalike_domain_is_not_an_invite() {
        assert_eq!(text("https://notdiscord.gg/abc"), ContentTypes::REGULAR_LINK);
        assert_eq!(text("https://my-discord.gg/abc"), ContentTypes::REGULAR_LINK);
        assert_eq!(text("https://cdn.discord.gg.example.com/x"), ContentTypes::REGULAR_LINK);
    }

    #[test]
    fn test_invite_text_inside_another_link_is_a_regular_link() {
        assert_eq!(
            text("https://example.com/?ref=discord.gg/abc"),
            ContentTypes::REGULAR_LINK
        );
        assert_eq!(
            text("https://example.com/discord.gg/abc"),
            ContentTypes::REGULAR_LINK
        );
    }

    #[test]
    fn test_link_blocking_channel_catches_invite_lookalikes() {
        use crate::core::restrictions::policy::evaluate_masks;
        use crate::core::restrictions::restriction_models::Verdict;

        for link in ["https://my-discord.gg/abc", "https://example.com/?ref=discord.gg/abc"] {
            let verdict = evaluate_masks(text(link), ContentTypes::empty(), ContentTypes::REGULAR_LINK);
            assert!(matches!(verdict, Verdict::Violation { .. }), "{link}");
        }
    }

    #[test]
    fn test_invites_in_running_text() {
        assert_eq!(text("discord.gg/abc discord.gg/def"), ContentTypes::DISCORD_INVITE);
        assert_eq!(
            text("(see discord.gg/abc)\ndiscord.gg/def"),
            ContentTypes::PLAIN_TEXT | ContentTypes::DISCORD_INVITE
        );
        assert_eq!(
            text("links: https://discord.gg/abc, https://example.com"),
            ContentTypes::PLAIN_TEXT | ContentTypes::DISCORD_INVITE | ContentTypes::REGULAR_LINK
        );
    }

    #[test]
    fn test_regular_link_with_text() {
        assert_eq!(
            text("check this: https://example.com"),
            ContentTypes::PLAIN_TEXT | ContentTypes::REGULAR_LINK
        );
    }

    #[test]
    fn test_bare_link_is_not_plain_text() {
        assert_eq!(text("https://example.com/page"), ContentTypes::REGULAR_LINK);
        assert_eq!(text("<https://example.com/page>"), ContentTypes::REGULAR_LINK);
    }

    #[test]
    fn test_image_links() {
        assert_eq!(text("https://cdn.example.com/cat.png"), ContentTypes::IMAGE_LINK);
        assert_eq!(
            text("https://cdn.example.com/a/b/cat.JPEG?width=200#top"),
            ContentTypes::IMAGE_LINK
        );
        assert_eq!(text("https://x.io/anim.gif."), ContentTypes::IMAGE_LINK);
        assert_eq!(text("https://x.io/pic.bmp"), ContentTypes::IMAGE_LINK);
        assert_eq!(text("https://x.io/pic.webp"), ContentTypes::IMAGE_LINK);
    }

    #[test]
    fn test_image_extension_in_query_is_a_regular_link() {
        assert_eq!(
            text("https://example.com/view?file=cat.png"),
            ContentTypes::REGULAR_LINK
        );
        assert_eq!(text("https://cat.png"), ContentTypes::REGULAR_LINK);
    }

    #[test]
    fn test_mixed_links_set_every_bit() {
        let mask = text("see https://example.com and https://x.io/a.png or discord.gg/abc");
        assert_eq!(
            mask,
            ContentTypes::PLAIN_TEXT
                | ContentTypes::REGULAR_LINK
                | ContentTypes::IMAGE_LINK
                | ContentTypes::DISCORD_INVITE
        );
    }

    #[test]
    fn test_attachments_split_by_declared_type() {
        let classifier = ContentClassifier::new();
        let image = attachment("cat.png", Some("image/png"));
        let file = attachment("notes.pdf", Some("application/pdf"));
        let undeclared = attachment("mystery.png", None);

        assert_eq!(
            classifier.detect("", std::slice::from_ref(&image), 0),
            ContentTypes::IMAGE_ATTACHMENT
        );
        assert_eq!(
            classifier.detect("", std::slice::from_ref(&file), 0),
            ContentTypes::FILE_ATTACHMENT
        );
        assert_eq!(
            classifier.detect("", &[undeclared], 0),
            ContentTypes::FILE_ATTACHMENT
        );
        assert_eq!(
            classifier.detect("", &[image, file], 0),
            ContentTypes::IMAGE_ATTACHMENT | ContentTypes::FILE_ATTACHMENT
        );
    }

    #[test]
    fn test_embeds() {
        let classifier = ContentClassifier::new();
        assert_eq!(classifier.detect("", &[], 1), ContentTypes::EMBED);
        assert_eq!(
            classifier.detect("look", &[], 2),
            ContentTypes::PLAIN_TEXT | ContentTypes::EMBED
        );
    }

    #[test]
    fn test_classify_keeps_message_references() {
        let message = IncomingMessage {
            message_id: 10,
            guild_id: 20,
            channel_id: 30,
            author_id: 40,
            content: "hi".to_string(),
            ..Default::default()
        };
        let classified = ContentClassifier::new().classify(&message);
        assert_eq!(classified.content, ContentTypes::PLAIN_TEXT);
        assert_eq!(classified.author_id, 40);
        assert_eq!(classified.channel_id, 30);
    }
}
