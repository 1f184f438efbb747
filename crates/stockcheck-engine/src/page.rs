//! Page capability abstraction.
//!
//! Defines the `ListingPage` trait the engine drives. The runtime implements
//! it on a Chromium tab; [`crate::testing::FakePage`] implements it in memory.
//!
//! Group handles are tagged with the page [`Generation`]. Every navigation
//! starts a new generation, and handles from an earlier one are rejected
//! with [`PageError::StaleHandle`] rather than re-resolved.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::OptionEntry;

/// Page-load counter. Bumped by every navigation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Opaque reference to a variant group on one page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle {
    pub generation: Generation,
    /// Slot in the page's group table for that generation.
    pub slot: usize,
}

/// Raw group data reported by the page, before the engine cleans it up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub label: Option<String>,
    /// Rendered position; only the relative order matters.
    pub position: usize,
    pub handle: GroupHandle,
}

/// Result of navigating to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    Loaded { final_url: String },
    /// A bot-protection interstitial was served instead of the listing.
    Challenged { marker: String },
}

/// Where an availability signal is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Banner or quantity text; the trimmed text content is the signal.
    Text,
    /// Purchase button; its disabled state is the signal.
    PurchaseControl,
}

/// One known availability signal location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSource {
    pub kind: SignalKind,
    pub selector: String,
}

impl SignalSource {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Text,
            selector: selector.into(),
        }
    }

    pub fn purchase_control(selector: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::PurchaseControl,
            selector: selector.into(),
        }
    }
}

/// The first availability signal found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalReading {
    Text { selector: String, text: String },
    PurchaseControl { selector: String, disabled: bool },
}

/// Faults raised by the page collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The execution context was destroyed, usually by a navigation-like
    /// re-render racing the call.
    #[error("page context invalidated: {0}")]
    Invalidated(String),

    #[error("stale group handle from {handle}, page is at {current}")]
    StaleHandle {
        handle: Generation,
        current: Generation,
    },

    #[error("no group in slot {0}")]
    UnknownGroup(usize),

    #[error("page timed out: {what} after {after_ms}ms")]
    Timeout { what: String, after_ms: u64 },

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("browser error: {0}")]
    Browser(String),
}

impl PageError {
    pub fn is_invalidation(&self) -> bool {
        matches!(self, PageError::Invalidated(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout { .. })
    }
}

/// A rendered listing page the engine can query and drive.
///
/// Implementations are exclusively owned for the duration of one check;
/// every method takes `&mut self` so two checks can never interleave on the
/// same page.
#[async_trait]
pub trait ListingPage: Send {
    /// Generation of the currently loaded page.
    fn generation(&self) -> Generation;

    /// Navigate to `url`. Starts a new generation.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<Navigation, PageError>;

    /// Wait until network and DOM activity stop. `Ok(false)` means the
    /// timeout elapsed first.
    async fn wait_for_settle(&mut self, timeout: Duration) -> Result<bool, PageError>;

    /// All variant selector groups on the current page.
    async fn group_snapshots(&mut self) -> Result<Vec<GroupSnapshot>, PageError>;

    /// Open a group's option list.
    async fn open_group(&mut self, handle: &GroupHandle) -> Result<(), PageError>;

    /// Options of an open group, in on-page order.
    async fn list_options(&mut self, handle: &GroupHandle) -> Result<Vec<OptionEntry>, PageError>;

    /// Select the option at `index` in the open list.
    async fn choose_option(&mut self, handle: &GroupHandle, index: usize) -> Result<(), PageError>;

    /// Close an open option list without selecting.
    async fn dismiss(&mut self, handle: &GroupHandle) -> Result<(), PageError>;

    /// Read the first present signal among `sources`, in order.
    async fn read_availability(
        &mut self,
        sources: &[SignalSource],
    ) -> Result<Option<SignalReading>, PageError>;
}

/// Reject a handle that does not belong to the page's current generation.
pub fn ensure_current<P: ListingPage + ?Sized>(
    page: &P,
    handle: &GroupHandle,
) -> Result<(), PageError> {
    let current = page.generation();
    if handle.generation != current {
        return Err(PageError::StaleHandle {
            handle: handle.generation,
            current,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_next() {
        assert_eq!(Generation(3).next(), Generation(4));
        assert_eq!(Generation(0).to_string(), "gen-0");
    }

    #[test]
    fn test_error_classification() {
        assert!(PageError::Invalidated("Execution context was destroyed".into()).is_invalidation());
        assert!(PageError::Timeout {
            what: "navigation".into(),
            after_ms: 45_000
        }
        .is_timeout());
        let stale = PageError::StaleHandle {
            handle: Generation(1),
            current: Generation(2),
        };
        assert_eq!(
            stale.to_string(),
            "stale group handle from gen-1, page is at gen-2"
        );
    }

    #[test]
    fn test_signal_reading_serializes_tagged() {
        let reading = SignalReading::PurchaseControl {
            selector: "#atcRedesignId_btn".into(),
            disabled: true,
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["kind"], "purchase_control");
        assert_eq!(json["disabled"], true);
    }
}
