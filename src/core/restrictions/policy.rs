// Policy evaluation - the single decision rule behind every restriction.
//
// Block-list first, then the allow-list. A non-empty allow-list is closed:
// anything not on it is rejected even if nobody blocked it explicitly.
// An empty allow-list means block-list mode, where everything not blocked
// passes. Preset-derived configs go through exactly the same path.

use super::content_types::ContentTypes;
use super::restriction_models::{RestrictionConfig, Verdict, ViolationKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, content: ContentTypes, config: &RestrictionConfig) -> Verdict {
        evaluate_masks(content, config.allowed(), config.blocked())
    }
}

/// The decision rule on bare masks.
pub fn evaluate_masks(content: ContentTypes, allowed: ContentTypes, blocked: ContentTypes) -> Verdict {
    if content.is_empty() {
        return Verdict::Permit;
    }

    let blocked_present = content & blocked;
    if !blocked_present.is_empty() {
        return Verdict::Violation {
            kind: ViolationKind::Blocked,
            offending: blocked_present,
        };
    }

    if !allowed.is_empty() {
        let extra = content.difference(allowed);
        if !extra.is_empty() {
            return Verdict::Violation {
                kind: ViolationKind::NotAllowed,
                offending: extra,
            };
        }
    }

    Verdict::Permit
}
