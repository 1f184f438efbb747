//! Core data types for variant requests, discovered groups and outcomes.

use serde::{Deserialize, Serialize};

use crate::page::GroupHandle;

/// Requested values that mean "nothing requested" once trimmed.
const PLACEHOLDER_VALUES: &[&str] = &["n/a", "na", "select", "rug"];

/// One requested dimension value, e.g. `size = "80 x 150 cm"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedDimension {
    /// Lower-cased dimension name (`size`, `variation`).
    pub name: String,
    /// Requested value as supplied, trimmed.
    pub value: String,
}

/// One unit of work: a listing plus the dimension values to select on it.
///
/// Immutable once built. Blank values are dropped at construction so a
/// dimension without a requested value can never produce an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRequest {
    id: String,
    listing_url: String,
    dimensions: Vec<RequestedDimension>,
}

impl VariantRequest {
    /// Build a request from ordered `(dimension, value)` pairs.
    pub fn new<I, K, V>(
        id: impl Into<String>,
        listing_url: impl Into<String>,
        dimensions: I,
    ) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let listing_url = listing_url.into().trim().to_string();
        if listing_url.is_empty() {
            return Err(InputError::MissingListingUrl);
        }

        let mut kept: Vec<RequestedDimension> = Vec::new();
        for (name, value) in dimensions {
            let name = name.as_ref().trim().to_lowercase();
            if name.is_empty() {
                return Err(InputError::EmptyDimensionName);
            }
            if kept.iter().any(|d| d.name == name) {
                return Err(InputError::DuplicateDimension(name));
            }
            let Some(value) = clean_value(value.as_ref()) else {
                continue;
            };
            kept.push(RequestedDimension { name, value });
        }

        Ok(Self {
            id: id.into(),
            listing_url,
            dimensions: kept,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    /// Requested dimensions in input order.
    pub fn dimensions(&self) -> &[RequestedDimension] {
        &self.dimensions
    }

    /// Value requested for `name`, if any.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if PLACEHOLDER_VALUES.contains(&lowered.as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// A variant selector discovered on the current page load.
///
/// Valid only for the page generation its handle carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantGroup {
    /// Label text as rendered, e.g. `"Colour:"`. Absent labels are allowed.
    pub label: Option<String>,
    /// Dimension the label's keywords point at, if any.
    pub dimension_guess: Option<String>,
    /// 0-based position in rendered document order.
    pub position: usize,
    pub handle: GroupHandle,
}

impl VariantGroup {
    /// Label without surrounding whitespace and trailing colon.
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .map(|l| l.trim().trim_end_matches(':').trim_end())
            .unwrap_or("")
    }
}

/// One selectable entry of an open group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionEntry {
    /// Position inside the open option list.
    pub index: usize,
    /// Machine-readable value token (e.g. `data-sku-value-name`).
    pub value: Option<String>,
    /// Human-readable label text.
    pub label: String,
    /// Explicit `disabled` attribute or `aria-disabled="true"`.
    pub disabled_marker: bool,
    /// Raw class attribute.
    pub class_list: String,
}

/// A requested dimension paired with the on-page group that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionAssignment {
    pub position: usize,
    pub dimension: String,
    pub value: String,
}

/// A requested dimension no group could be found for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionGap {
    pub dimension: String,
    pub value: String,
}

/// Final status of a listing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    InStock,
    OutOfStock,
    Unknown,
    Blocked,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::InStock => "IN_STOCK",
            CheckStatus::OutOfStock => "OUT_OF_STOCK",
            CheckStatus::Unknown => "UNKNOWN",
            CheckStatus::Blocked => "BLOCKED",
            CheckStatus::Error => "ERROR",
        }
    }

    /// Statuses after which no further groups are processed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckStatus::InStock | CheckStatus::OutOfStock | CheckStatus::Blocked
        )
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt stopped short of evaluating the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    OptionNotFound,
    OptionDisabled,
    OptionNotInteractable,
    ChallengeDetected,
    /// A collaborator (browser, page script) failed unexpectedly.
    Fault,
}

/// Result of one listing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub request_id: String,
    pub listing_url: String,
    pub status: CheckStatus,
    pub reason: Option<String>,
    pub failure: Option<FailureKind>,
    /// Assignments a selection was attempted for, in processing order.
    pub attempted: Vec<DimensionAssignment>,
    pub gaps: Vec<ResolutionGap>,
    /// Attempts made, including retries by the caller.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl CheckOutcome {
    /// Whether a fresh attempt could plausibly change the result.
    ///
    /// Selection failures are deliberate determinations and are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure,
            Some(FailureKind::ChallengeDetected) | Some(FailureKind::Fault)
        )
    }
}

/// Errors raised while building a [`VariantRequest`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("listing URL is missing")]
    MissingListingUrl,

    #[error("dimension name is empty")]
    EmptyDimensionName,

    #[error("dimension '{0}' given more than once")]
    DuplicateDimension(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_drops_blank_and_placeholder_values() {
        let req = VariantRequest::new(
            "row-4",
            "https://www.ebay.co.uk/itm/1234",
            [("Size", "  "), ("variation", "Cream - Greekey"), ("pattern", "N/A")],
        )
        .unwrap();
        assert_eq!(req.dimensions().len(), 1);
        assert_eq!(req.value_of("VARIATION"), Some("Cream - Greekey"));
        assert_eq!(req.value_of("size"), None);
    }

    #[test]
    fn test_request_drops_sheet_filler_values() {
        let req = VariantRequest::new(
            "row-9",
            "https://www.ebay.co.uk/itm/1234",
            [("size", "Select"), ("variation", " RUG "), ("colour", "Navy")],
        )
        .unwrap();
        assert_eq!(req.dimensions().len(), 1);
        assert_eq!(req.value_of("size"), None);
        assert_eq!(req.value_of("variation"), None);
        assert_eq!(req.value_of("colour"), Some("Navy"));
    }

    #[test]
    fn test_request_keeps_input_order() {
        let req = VariantRequest::new("r", "u", [("variation", "Grey"), ("size", "60 x 110 cm")])
            .unwrap();
        let names: Vec<_> = req.dimensions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["variation", "size"]);
    }

    #[test]
    fn test_request_rejects_duplicates_and_missing_url() {
        let dup = VariantRequest::new("r", "u", [("size", "S"), ("SIZE", "M")]);
        assert_eq!(dup, Err(InputError::DuplicateDimension("size".into())));

        let missing = VariantRequest::new("r", "   ", [("size", "S")]);
        assert_eq!(missing, Err(InputError::MissingListingUrl));
    }

    #[test]
    fn test_request_without_dimensions_is_allowed() {
        let req = VariantRequest::new("r", "u", Vec::<(&str, &str)>::new()).unwrap();
        assert!(req.is_empty());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&CheckStatus::OutOfStock).unwrap();
        assert_eq!(json, "\"OUT_OF_STOCK\"");
        assert!(CheckStatus::Blocked.is_terminal());
        assert!(!CheckStatus::Error.is_terminal());
    }
}
