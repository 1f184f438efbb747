//! Engine configuration.
//!
//! Every table the engine consults (dimension keywords, matcher rules,
//! availability sources, disabled markers, timings) lives here and is
//! supplied at construction. All fields have defaults, so a partial JSON
//! document deserializes into a complete config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matcher::{normalize, MatchRule};
use crate::page::SignalSource;

/// Keywords that identify one dimension in a group label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRule {
    pub dimension: String,
    pub keywords: Vec<String>,
}

impl DimensionRule {
    pub fn new(dimension: &str, keywords: &[&str]) -> Self {
        Self {
            dimension: dimension.to_lowercase(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn hits(&self, normalized_label: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && normalized_label.contains(k.as_str()))
    }
}

/// Mapping from dimension name to the label keywords that identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionKeywords {
    rules: Vec<DimensionRule>,
}

impl Default for DimensionKeywords {
    fn default() -> Self {
        const COLOUR: &[&str] = &["colour", "color", "design", "style", "pattern"];
        Self {
            rules: vec![
                DimensionRule::new("size", &["size", "length", "dimensions"]),
                DimensionRule::new("variation", COLOUR),
                DimensionRule::new("colour", COLOUR),
                DimensionRule::new("color", COLOUR),
            ],
        }
    }
}

impl DimensionKeywords {
    pub fn new(rules: Vec<DimensionRule>) -> Self {
        Self { rules }
    }

    /// Add or replace the keywords for one dimension.
    pub fn with_rule(mut self, rule: DimensionRule) -> Self {
        self.rules.retain(|r| r.dimension != rule.dimension);
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[DimensionRule] {
        &self.rules
    }

    fn rule_for(&self, dimension: &str) -> Option<&DimensionRule> {
        let dimension = dimension.to_lowercase();
        self.rules.iter().find(|r| r.dimension == dimension)
    }

    /// Whether `label` carries one of the keywords of `dimension`.
    pub fn label_matches(&self, dimension: &str, label: &str) -> bool {
        let label = normalize(label);
        self.rule_for(dimension).is_some_and(|r| r.hits(&label))
    }

    /// First dimension whose keywords appear in `label`.
    pub fn guess(&self, label: &str) -> Option<&str> {
        let label = normalize(label);
        self.rules
            .iter()
            .find(|r| r.hits(&label))
            .map(|r| r.dimension.as_str())
    }

    /// Whether any known dimension claims `label`.
    pub fn recognizes(&self, label: &str) -> bool {
        self.guess(label).is_some()
    }
}

/// Bounded waits used at each suspension point, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub navigation_timeout_ms: u64,
    /// Settle wait right after navigation.
    pub settle_timeout_ms: u64,
    /// Fixed pause after the settle wait, before discovery.
    pub post_navigation_delay_ms: u64,
    /// Pause after opening an option list so it can render.
    pub option_list_settle_ms: u64,
    /// Quiescence wait after a selection.
    pub quiescence_timeout_ms: u64,
    /// Fixed pause used when quiescence detection itself times out.
    pub quiescence_fallback_ms: u64,
    /// Fixed pause before reading availability signals.
    pub pre_evaluation_delay_ms: u64,
    /// Pause before the single availability re-read.
    pub evaluation_retry_delay_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 45_000,
            settle_timeout_ms: 5_000,
            post_navigation_delay_ms: 800,
            option_list_settle_ms: 300,
            quiescence_timeout_ms: 5_000,
            quiescence_fallback_ms: 800,
            pre_evaluation_delay_ms: 1_000,
            evaluation_retry_delay_ms: 1_000,
        }
    }
}

impl Timings {
    /// No fixed pauses; timeouts kept. Used by tests and the in-memory page.
    pub fn immediate() -> Self {
        Self {
            post_navigation_delay_ms: 0,
            option_list_settle_ms: 0,
            quiescence_fallback_ms: 0,
            pre_evaluation_delay_ms: 0,
            evaluation_retry_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

/// Where availability is read from and how it is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// Read in order; the first signal present wins.
    pub sources: Vec<SignalSource>,
    /// Phrases in signal text meaning the selection cannot be bought.
    pub out_of_stock_phrases: Vec<String>,
    /// Report UNKNOWN instead of IN_STOCK when no signal can be read.
    pub strict: bool,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SignalSource::text(r#"[data-testid="x-msku__availability-message"]"#),
                SignalSource::text("#x-msku__availability-message"),
                SignalSource::text("#qtySubTxt"),
                SignalSource::text(r#"[data-testid="availability-text"]"#),
                SignalSource::text(r#"[data-testid="availability-messaging"]"#),
                SignalSource::purchase_control(r#"button[data-testid="art-atc-button"]"#),
                SignalSource::purchase_control("#atcRedesignId_btn"),
            ],
            out_of_stock_phrases: vec!["out of stock".into(), "unavailable".into()],
            strict: false,
        }
    }
}

/// Markers that flag an individual option as unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisabledMarkers {
    /// Class name carried by disabled options.
    pub class_name: String,
    /// Phrase in the option label meaning it is out of stock.
    pub label_phrase: String,
}

impl Default for DisabledMarkers {
    fn default() -> Self {
        Self {
            class_name: "listbox__option--disabled".into(),
            label_phrase: "out of stock".into(),
        }
    }
}

/// Everything the engine needs besides the page itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub keywords: DimensionKeywords,
    /// Let an unresolved dimension claim the single remaining group whose
    /// label no keyword recognizes.
    pub positional_fallback: bool,
    pub match_rules: Vec<MatchRule>,
    pub disabled: DisabledMarkers,
    pub availability: AvailabilityConfig,
    pub timings: Timings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keywords: DimensionKeywords::default(),
            positional_fallback: true,
            match_rules: MatchRule::DEFAULT_CHAIN.to_vec(),
            disabled: DisabledMarkers::default(),
            availability: AvailabilityConfig::default(),
            timings: Timings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keywords_guess_labels() {
        let kw = DimensionKeywords::default();
        assert_eq!(kw.guess("Size:"), Some("size"));
        assert_eq!(kw.guess("Colour:"), Some("variation"));
        assert_eq!(kw.guess("  Rug   Design "), Some("variation"));
        assert_eq!(kw.guess("Length"), Some("size"));
        assert_eq!(kw.guess("Quantity"), None);
        assert!(kw.label_matches("colour", "Color"));
        assert!(!kw.label_matches("size", "Colour"));
    }

    #[test]
    fn test_keywords_extend_with_new_dimension() {
        let kw = DimensionKeywords::default()
            .with_rule(DimensionRule::new("material", &["material", "fabric"]));
        assert_eq!(kw.guess("Fabric:"), Some("material"));
        assert!(kw.label_matches("MATERIAL", "Material"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{ "positional_fallback": false, "timings": { "quiescence_timeout_ms": 2500 } }"#,
        )
        .unwrap();
        assert!(!cfg.positional_fallback);
        assert_eq!(cfg.timings.quiescence_timeout_ms, 2_500);
        assert_eq!(cfg.timings.navigation_timeout_ms, 45_000);
        assert_eq!(cfg.availability.sources.len(), 7);
        assert_eq!(cfg.match_rules, MatchRule::DEFAULT_CHAIN.to_vec());
    }

    #[test]
    fn test_keywords_deserialize_as_list() {
        let kw: DimensionKeywords = serde_json::from_str(
            r#"[{ "dimension": "pack", "keywords": ["pack", "quantity"] }]"#,
        )
        .unwrap();
        assert_eq!(kw.guess("Pack size"), Some("pack"));
        assert_eq!(kw.rules().len(), 1);
    }
}
