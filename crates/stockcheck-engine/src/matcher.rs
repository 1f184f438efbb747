//! Option matching: does a displayed option satisfy a requested value?
//!
//! Matching is an ordered chain of pure rules, first success wins:
//!
//! 1. [`MatchRule::Substring`]: normalized requested text is contained in
//!    the normalized displayed text.
//! 2. [`MatchRule::BaseColour`]: seller suffixes after `" - "` are stripped
//!    (`"Silver - Gel Back 59"` → `"silver"`) and the bases are compared by
//!    containment.
//! 3. [`MatchRule::BaseSize`]: imperial annotations in parentheses and
//!    qualifiers such as `Most popular` are stripped from size-like labels.
//!
//! There is no fuzzy matching. A requested value sharing no contiguous
//! normalized text with the displayed one never matches.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator sellers put between a colour and their own suffix.
const COLOUR_SUFFIX_SEPARATOR: &str = " - ";

/// Trailing qualifier words sellers append to size labels.
const SIZE_QUALIFIERS: &[&str] = &["most popular", "selected"];

/// Lower-case, collapse whitespace runs, trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One step of the matching chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Substring,
    BaseColour,
    BaseSize,
}

impl MatchRule {
    pub const DEFAULT_CHAIN: [MatchRule; 3] =
        [MatchRule::Substring, MatchRule::BaseColour, MatchRule::BaseSize];

    pub fn name(&self) -> &'static str {
        match self {
            MatchRule::Substring => "substring",
            MatchRule::BaseColour => "base_colour",
            MatchRule::BaseSize => "base_size",
        }
    }

    /// Apply this rule alone.
    pub fn test(&self, displayed: &str, requested: &str) -> bool {
        match self {
            MatchRule::Substring => substring(displayed, requested),
            MatchRule::BaseColour => base_colour(displayed, requested),
            MatchRule::BaseSize => base_size(displayed, requested),
        }
    }
}

fn substring(displayed: &str, requested: &str) -> bool {
    let requested = normalize(requested);
    !requested.is_empty() && normalize(displayed).contains(&requested)
}

fn colour_base(text: &str) -> String {
    let text = text.trim();
    let base = match text.find(COLOUR_SUFFIX_SEPARATOR) {
        Some(at) => &text[..at],
        None => text,
    };
    normalize(base)
}

fn base_colour(displayed: &str, requested: &str) -> bool {
    if !displayed.contains(COLOUR_SUFFIX_SEPARATOR) && !requested.contains(COLOUR_SUFFIX_SEPARATOR)
    {
        return false;
    }
    let shown = colour_base(displayed);
    let wanted = colour_base(requested);
    if shown.is_empty() || wanted.is_empty() {
        return false;
    }
    shown.contains(&wanted) || wanted.contains(&shown)
}

fn looks_like_size(text: &str) -> bool {
    static DIMENSION_TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = DIMENSION_TOKEN.get_or_init(|| {
        Regex::new(r"(?i)cm|x.*\d|\d.*x").expect("dimension token regex is valid")
    });
    re.is_match(text)
}

fn size_base(text: &str) -> String {
    let head = match text.find('(') {
        Some(at) => &text[..at],
        None => text,
    };
    let mut base = normalize(head);
    for qualifier in SIZE_QUALIFIERS {
        base = base.replace(qualifier, "");
    }
    normalize(&base)
}

fn base_size(displayed: &str, requested: &str) -> bool {
    if !looks_like_size(displayed) {
        return false;
    }
    let shown = size_base(displayed);
    let wanted = size_base(requested);
    if shown.is_empty() || wanted.is_empty() {
        return false;
    }
    shown == wanted || shown.contains(&wanted) || shown.replace(' ', "") == wanted.replace(' ', "")
}

/// Ordered matching chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatcher {
    rules: Vec<MatchRule>,
}

impl Default for OptionMatcher {
    fn default() -> Self {
        Self::new(MatchRule::DEFAULT_CHAIN.to_vec())
    }
}

impl OptionMatcher {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        Self { rules }
    }

    /// The first rule that accepts the pair, if any.
    pub fn match_rule(&self, displayed: &str, requested: &str) -> Option<MatchRule> {
        let hit = self
            .rules
            .iter()
            .copied()
            .find(|rule| rule.test(displayed, requested));
        match hit {
            Some(rule) => tracing::debug!(
                displayed,
                requested,
                rule = rule.name(),
                "option matched"
            ),
            None => tracing::trace!(displayed, requested, "option did not match"),
        }
        hit
    }

    pub fn matches(&self, displayed: &str, requested: &str) -> bool {
        self.match_rule(displayed, requested).is_some()
    }
}

/// Match with the default chain.
pub fn matches(displayed: &str, requested: &str) -> bool {
    OptionMatcher::default().matches(displayed, requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Silver   Black\t- Greekey "), "silver black - greekey");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_colour_suffix_examples() {
        assert!(matches("Silver Black - Greekey", "Silver Black"));
        assert!(matches("Silver - Gel Back 59", "Silver Black"));
        assert!(!matches("Grey - Gel Back 59", "Silver"));
    }

    #[test]
    fn test_size_annotation_examples() {
        assert!(matches("40 x 60 cm (1 ft 4 in x 2 ft)", "40 x 60 cm"));
        assert!(matches(
            "50 x 80 cm (1 ft 8 in x 2 ft 4 in) Most popular",
            "50 x 80 cm"
        ));
    }

    #[test]
    fn test_rule_that_fired() {
        let m = OptionMatcher::default();
        assert_eq!(
            m.match_rule("Silver Black - Greekey", "silver black"),
            Some(MatchRule::Substring)
        );
        assert_eq!(
            m.match_rule("Silver - Gel Back 59", "Silver Black"),
            Some(MatchRule::BaseColour)
        );
        assert_eq!(
            m.match_rule("60x110 cm", "60 x 110 cm"),
            Some(MatchRule::BaseSize)
        );
    }

    #[test]
    fn test_requested_suffix_against_plain_option() {
        // Sheet carries the seller suffix, listing does not.
        assert!(matches("Cream", "Cream - Greekey"));
        assert!(!matches("Cream", "Green - Greekey"));
    }

    #[test]
    fn test_unrelated_values_never_match() {
        assert!(!matches("Navy", "Beige"));
        assert!(!matches("120 x 170 cm", "80 x 150 cm"));
        assert!(!matches("Anything", ""));
        assert!(!matches("Anything", "   "));
    }

    #[test]
    fn test_size_rule_ignores_non_size_labels() {
        assert!(!MatchRule::BaseSize.test("Dark Grey", "Dark Grey (new)"));
        assert!(MatchRule::BaseSize.test("160x230 cm selected", "160 x 230 cm"));
    }

    #[test]
    fn test_ambiguous_prefix_matches_every_candidate() {
        // Caller picks the first in page order; both satisfy the matcher.
        assert!(matches("Beige Brown - X", "Beige"));
        assert!(matches("Beige Black - X", "Beige"));
    }

    #[test]
    fn test_restricted_chain() {
        let m = OptionMatcher::new(vec![MatchRule::Substring]);
        assert!(!m.matches("Silver - Gel Back 59", "Silver Black"));
    }
}
