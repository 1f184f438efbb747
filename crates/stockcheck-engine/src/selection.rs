//! Selection executor: open a group, find the requested option, classify
//! it, select it, and wait for the page to settle.

use serde::{Deserialize, Serialize};

use crate::config::{DisabledMarkers, Timings};
use crate::matcher::{MatchRule, OptionMatcher};
use crate::page::{ensure_current, GroupHandle, ListingPage, PageError};
use crate::types::{CheckStatus, FailureKind, OptionEntry, VariantGroup};

/// Independent signals that mark an option unavailable. Any one suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledSignal {
    /// `disabled` attribute or `aria-disabled="true"`.
    DisabledMarker,
    /// The disabled style class.
    DisabledClass,
    /// Label text contains the out-of-stock phrase.
    OutOfStockLabel,
}

impl DisabledSignal {
    pub const ALL: [DisabledSignal; 3] = [
        DisabledSignal::DisabledMarker,
        DisabledSignal::DisabledClass,
        DisabledSignal::OutOfStockLabel,
    ];

    pub fn fires(&self, option: &OptionEntry, markers: &DisabledMarkers) -> bool {
        match self {
            DisabledSignal::DisabledMarker => option.disabled_marker,
            DisabledSignal::DisabledClass => option
                .class_list
                .split_whitespace()
                .any(|c| c == markers.class_name),
            DisabledSignal::OutOfStockLabel => option
                .label
                .to_lowercase()
                .contains(&markers.label_phrase.to_lowercase()),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            DisabledSignal::DisabledMarker => "aria-disabled",
            DisabledSignal::DisabledClass => "disabled class",
            DisabledSignal::OutOfStockLabel => "out-of-stock label",
        }
    }
}

/// Every disabled signal `option` carries. Empty means enabled.
pub fn disabled_signals(option: &OptionEntry, markers: &DisabledMarkers) -> Vec<DisabledSignal> {
    DisabledSignal::ALL
        .into_iter()
        .filter(|s| s.fires(option, markers))
        .collect()
}

/// A selection that did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionFailure {
    OptionNotFound {
        group: String,
        requested: String,
    },
    /// The value exists but is unavailable. A determination, not an error.
    OptionDisabled {
        label: String,
        signals: Vec<DisabledSignal>,
    },
    OptionNotInteractable {
        requested: String,
        detail: String,
    },
}

impl SelectionFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            SelectionFailure::OptionNotFound { .. } => FailureKind::OptionNotFound,
            SelectionFailure::OptionDisabled { .. } => FailureKind::OptionDisabled,
            SelectionFailure::OptionNotInteractable { .. } => FailureKind::OptionNotInteractable,
        }
    }

    /// Outcome status this failure maps to.
    pub fn status(&self) -> CheckStatus {
        match self {
            SelectionFailure::OptionDisabled { .. } => CheckStatus::OutOfStock,
            _ => CheckStatus::Error,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            SelectionFailure::OptionNotFound { group, requested } => {
                if group.is_empty() {
                    format!("value not found: '{requested}'")
                } else {
                    format!("value not found: '{requested}' in group '{group}'")
                }
            }
            SelectionFailure::OptionDisabled { label, signals } => {
                let via: Vec<_> = signals.iter().map(DisabledSignal::describe).collect();
                format!("option disabled: '{label}' ({})", via.join(", "))
            }
            SelectionFailure::OptionNotInteractable { requested, detail } => {
                format!("option not interactable: '{requested}' ({detail})")
            }
        }
    }
}

/// Result of one selection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected { label: String, rule: MatchRule },
    Failed(SelectionFailure),
}

/// Find the first option matching `requested`, preferring value tokens over
/// labels. Options keep their on-page order, so ambiguous requests resolve
/// to the earliest candidate.
fn find_option<'o>(
    options: &'o [OptionEntry],
    requested: &str,
    matcher: &OptionMatcher,
) -> Option<(&'o OptionEntry, MatchRule)> {
    let by_value = options.iter().find_map(|o| {
        let value = o.value.as_deref()?;
        matcher.match_rule(value, requested).map(|rule| (o, rule))
    });
    by_value.or_else(|| {
        options
            .iter()
            .find_map(|o| matcher.match_rule(&o.label, requested).map(|rule| (o, rule)))
    })
}

/// Select `requested` in `group`.
///
/// Collaborator faults are returned as `Err`; everything the executor can
/// decide on its own (missing value, disabled option) is a
/// [`SelectionOutcome::Failed`].
pub async fn select<P: ListingPage + ?Sized>(
    page: &mut P,
    group: &VariantGroup,
    requested: &str,
    matcher: &OptionMatcher,
    markers: &DisabledMarkers,
    timings: &Timings,
) -> Result<SelectionOutcome, PageError> {
    ensure_current(page, &group.handle)?;
    let handle = group.handle;
    let group_label = group.display_label().to_string();
    tracing::debug!(group = %group_label, requested, "selecting option");

    page.open_group(&handle).await?;
    pause(timings.option_list_settle_ms).await;

    let options = page.list_options(&handle).await?;
    let Some((option, rule)) = find_option(&options, requested, matcher) else {
        close_list(page, &handle, &group_label).await;
        return Ok(SelectionOutcome::Failed(SelectionFailure::OptionNotFound {
            group: group_label,
            requested: requested.to_string(),
        }));
    };

    let signals = disabled_signals(option, markers);
    if !signals.is_empty() {
        tracing::info!(option = %option.label, ?signals, "option is disabled");
        close_list(page, &handle, &group_label).await;
        return Ok(SelectionOutcome::Failed(SelectionFailure::OptionDisabled {
            label: option.label.clone(),
            signals,
        }));
    }

    match page.choose_option(&handle, option.index).await {
        Ok(()) => {}
        Err(PageError::NotInteractable(detail)) => {
            close_list(page, &handle, &group_label).await;
            return Ok(SelectionOutcome::Failed(
                SelectionFailure::OptionNotInteractable {
                    requested: requested.to_string(),
                    detail,
                },
            ));
        }
        Err(e) => return Err(e),
    }

    wait_for_quiescence(page, timings).await?;
    Ok(SelectionOutcome::Selected {
        label: option.label.clone(),
        rule,
    })
}

/// Dismiss an option list after a failed selection. A list left open only
/// matters for the next selection, which reopens its own group anyway.
async fn close_list<P: ListingPage + ?Sized>(page: &mut P, handle: &GroupHandle, group: &str) {
    if let Err(e) = page.dismiss(handle).await {
        tracing::debug!(group, error = %e, "option list may still be open");
    }
}

/// Block until the page is quiet, falling back to a fixed pause when idle
/// detection times out or the context is torn down by a re-render.
pub async fn wait_for_quiescence<P: ListingPage + ?Sized>(
    page: &mut P,
    timings: &Timings,
) -> Result<(), PageError> {
    match page
        .wait_for_settle(Timings::ms(timings.quiescence_timeout_ms))
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!("page not idle within timeout, continuing after fixed delay");
            pause(timings.quiescence_fallback_ms).await;
            Ok(())
        }
        Err(e) if e.is_timeout() || e.is_invalidation() => {
            tracing::debug!(error = %e, "idle detection failed, continuing after fixed delay");
            pause(timings.quiescence_fallback_ms).await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub(crate) async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Timings::ms(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DimensionKeywords;
    use crate::discovery::discover_groups;
    use crate::testing::{FakeGroup, FakeOption, FakePage, PageCall};
    use std::time::Duration;

    fn entry(label: &str) -> OptionEntry {
        OptionEntry {
            label: label.into(),
            ..OptionEntry::default()
        }
    }

    #[test]
    fn test_enabled_option_has_no_signals() {
        assert!(disabled_signals(&entry("Grey"), &DisabledMarkers::default()).is_empty());
    }

    #[test]
    fn test_each_disabled_signal_alone() {
        let markers = DisabledMarkers::default();

        let aria = OptionEntry {
            disabled_marker: true,
            ..entry("Grey")
        };
        assert_eq!(
            disabled_signals(&aria, &markers),
            [DisabledSignal::DisabledMarker]
        );

        let class = OptionEntry {
            class_list: "listbox__option listbox__option--disabled".into(),
            ..entry("Grey")
        };
        assert_eq!(
            disabled_signals(&class, &markers),
            [DisabledSignal::DisabledClass]
        );

        let text = entry("Grey - Out of Stock");
        assert_eq!(
            disabled_signals(&text, &markers),
            [DisabledSignal::OutOfStockLabel]
        );
    }

    #[test]
    fn test_disabled_signals_combine() {
        let markers = DisabledMarkers::default();
        let two = OptionEntry {
            disabled_marker: true,
            class_list: "listbox__option--disabled".into(),
            ..entry("Grey")
        };
        assert_eq!(disabled_signals(&two, &markers).len(), 2);

        let all = OptionEntry {
            disabled_marker: true,
            class_list: "listbox__option--disabled".into(),
            ..entry("Grey (out of stock)")
        };
        assert_eq!(disabled_signals(&all, &markers), DisabledSignal::ALL);
    }

    #[test]
    fn test_class_signal_needs_whole_class_name() {
        let option = OptionEntry {
            class_list: "listbox__option--disabled-hint".into(),
            ..entry("Grey")
        };
        assert!(disabled_signals(&option, &DisabledMarkers::default()).is_empty());
    }

    #[test]
    fn test_value_token_preferred_over_label() {
        let options = vec![
            OptionEntry {
                index: 0,
                value: Some("Cream".into()),
                label: "Beige Brown".into(),
                ..OptionEntry::default()
            },
            OptionEntry {
                index: 1,
                value: Some("Beige".into()),
                label: "Cream".into(),
                ..OptionEntry::default()
            },
        ];
        let (hit, _) = find_option(&options, "Cream", &OptionMatcher::default()).unwrap();
        assert_eq!(hit.index, 0);
        let (hit, _) = find_option(&options, "Beige", &OptionMatcher::default()).unwrap();
        assert_eq!(hit.index, 1);
    }

    #[test]
    fn test_first_on_page_match_wins() {
        let options = vec![
            OptionEntry {
                index: 0,
                ..entry("Beige Brown - X")
            },
            OptionEntry {
                index: 1,
                ..entry("Beige Black - X")
            },
        ];
        let (hit, _) = find_option(&options, "Beige", &OptionMatcher::default()).unwrap();
        assert_eq!(hit.index, 0);
    }

    async fn loaded(page: &mut FakePage) -> Vec<VariantGroup> {
        page.goto("https://example.com/itm/1", Duration::from_secs(1))
            .await
            .unwrap();
        discover_groups(page, &DimensionKeywords::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_select_enabled_option() {
        let mut page = FakePage::new().with_group(FakeGroup::new(
            "Size:",
            vec![
                FakeOption::new("40 x 60 cm (1 ft 4 in x 2 ft)"),
                FakeOption::new("50 x 80 cm (1 ft 8 in x 2 ft 4 in) Most popular"),
            ],
        ));
        let groups = loaded(&mut page).await;
        let outcome = select(
            &mut page,
            &groups[0],
            "50 x 80 cm",
            &OptionMatcher::default(),
            &DisabledMarkers::default(),
            &Timings::immediate(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, SelectionOutcome::Selected { .. }));
        assert_eq!(
            page.chosen(),
            [("Size:".to_string(), "50 x 80 cm (1 ft 8 in x 2 ft 4 in) Most popular".to_string())]
        );
        assert!(page.calls().contains(&PageCall::Settle));
    }

    #[tokio::test]
    async fn test_select_disabled_option_dismisses_list() {
        let mut page = FakePage::new().with_group(FakeGroup::new(
            "Colour:",
            vec![FakeOption::new("Grey").disabled_class()],
        ));
        let groups = loaded(&mut page).await;
        let outcome = select(
            &mut page,
            &groups[0],
            "Grey",
            &OptionMatcher::default(),
            &DisabledMarkers::default(),
            &Timings::immediate(),
        )
        .await
        .unwrap();
        let SelectionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.status(), CheckStatus::OutOfStock);
        assert!(failure.reason().starts_with("option disabled"));
        assert!(page.chosen().is_empty());
        assert!(page.calls().contains(&PageCall::Dismiss("Colour:".into())));
    }

    #[tokio::test]
    async fn test_select_missing_value() {
        let mut page = FakePage::new()
            .with_group(FakeGroup::new("Colour:", vec![FakeOption::new("Navy")]));
        let groups = loaded(&mut page).await;
        let outcome = select(
            &mut page,
            &groups[0],
            "Beige",
            &OptionMatcher::default(),
            &DisabledMarkers::default(),
            &Timings::immediate(),
        )
        .await
        .unwrap();
        let SelectionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind(), FailureKind::OptionNotFound);
        assert_eq!(failure.status(), CheckStatus::Error);
        assert_eq!(failure.reason(), "value not found: 'Beige' in group 'Colour'");
    }

    #[tokio::test]
    async fn test_select_not_interactable_option_is_error() {
        let mut page = FakePage::new().with_group(FakeGroup::new(
            "Size:",
            vec![FakeOption::new("S").not_interactable(), FakeOption::new("M")],
        ));
        let groups = loaded(&mut page).await;
        let outcome = select(
            &mut page,
            &groups[0],
            "S",
            &OptionMatcher::default(),
            &DisabledMarkers::default(),
            &Timings::immediate(),
        )
        .await
        .unwrap();
        let SelectionOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind(), FailureKind::OptionNotInteractable);
        assert_eq!(failure.status(), CheckStatus::Error);
        assert_eq!(
            failure.reason(),
            "option not interactable: 'S' (timeout clicking 'S')"
        );
        assert!(page.chosen().is_empty());
        assert!(page.calls().contains(&PageCall::Dismiss("Size:".into())));
        assert!(!page.calls().contains(&PageCall::Settle));
    }

    #[tokio::test]
    async fn test_stale_handle_rejected_after_navigation() {
        let mut page = FakePage::new()
            .with_group(FakeGroup::new("Colour:", vec![FakeOption::new("Navy")]));
        let groups = loaded(&mut page).await;
        page.goto("https://example.com/itm/2", Duration::from_secs(1))
            .await
            .unwrap();
        let err = select(
            &mut page,
            &groups[0],
            "Navy",
            &OptionMatcher::default(),
            &DisabledMarkers::default(),
            &Timings::immediate(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PageError::StaleHandle { .. }));
        assert!(!page.calls().iter().any(|c| matches!(c, PageCall::Open(_))));
    }

    #[tokio::test]
    async fn test_quiescence_timeout_falls_back() {
        let mut page = FakePage::new().never_settles();
        wait_for_quiescence(&mut page, &Timings::immediate())
            .await
            .unwrap();
    }
}
