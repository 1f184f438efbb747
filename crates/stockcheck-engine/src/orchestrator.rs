//! Listing check orchestrator: the per-listing state machine.
//!
//! ```text
//! Navigating ─► Discovering ─► Resolving ─┬─► Selecting(0) ─► … ─► Selecting(n-1) ─┐
//!     │                                   └──────────────────────────────────────────┴─► Evaluating ─► Done
//!     └─► Challenged                      any fault / failed selection ─► Failed
//! ```
//!
//! A check never panics or returns an error: collaborator faults at any
//! state land in `Failed` and become an `ERROR` outcome carrying the fault
//! text.

use std::time::Instant;

use crate::availability::evaluate;
use crate::config::{EngineConfig, Timings};
use crate::discovery::discover_groups;
use crate::matcher::OptionMatcher;
use crate::page::{ListingPage, Navigation, PageError};
use crate::resolver::resolve;
use crate::selection::{pause, select, wait_for_quiescence, SelectionFailure, SelectionOutcome};
use crate::types::{
    CheckOutcome, CheckStatus, DimensionAssignment, FailureKind, ResolutionGap, VariantGroup,
    VariantRequest,
};

/// States of one check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Navigating,
    Discovering,
    Resolving,
    /// Selecting the assignment at this index.
    Selecting(usize),
    Evaluating,
    Done,
    Challenged,
    Failed,
}

impl CheckState {
    pub fn is_final(&self) -> bool {
        matches!(self, CheckState::Done | CheckState::Challenged | CheckState::Failed)
    }
}

/// Working data of one attempt.
struct Attempt<'r> {
    request: &'r VariantRequest,
    groups: Vec<VariantGroup>,
    assignments: Vec<DimensionAssignment>,
    gaps: Vec<ResolutionGap>,
    attempted: Vec<DimensionAssignment>,
    status: CheckStatus,
    reason: Option<String>,
    failure: Option<FailureKind>,
}

impl<'r> Attempt<'r> {
    fn new(request: &'r VariantRequest) -> Self {
        Self {
            request,
            groups: Vec::new(),
            assignments: Vec::new(),
            gaps: Vec::new(),
            attempted: Vec::new(),
            status: CheckStatus::Error,
            reason: None,
            failure: None,
        }
    }

    fn fail(&mut self, status: CheckStatus, kind: FailureKind, reason: String) {
        self.status = status;
        self.failure = Some(kind);
        self.reason = Some(reason);
    }

    fn gap_note(&self) -> Option<String> {
        if self.gaps.is_empty() {
            return None;
        }
        let dims: Vec<_> = self
            .gaps
            .iter()
            .map(|g| format!("{}='{}'", g.dimension, g.value))
            .collect();
        Some(format!("no group found for {}", dims.join(", ")))
    }

    fn group_at(&self, position: usize) -> Option<&VariantGroup> {
        self.groups.iter().find(|g| g.position == position)
    }
}

/// Drives one listing check against an exclusively borrowed page.
#[derive(Debug, Clone)]
pub struct ListingChecker {
    config: EngineConfig,
    matcher: OptionMatcher,
}

impl Default for ListingChecker {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ListingChecker {
    pub fn new(config: EngineConfig) -> Self {
        let matcher = OptionMatcher::new(config.match_rules.clone());
        Self { config, matcher }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one fresh, independent attempt for `request`.
    ///
    /// Nothing is cached between calls; the page is navigated anew each time.
    pub async fn check_listing<P: ListingPage + ?Sized>(
        &self,
        page: &mut P,
        request: &VariantRequest,
    ) -> CheckOutcome {
        let started = Instant::now();
        let mut attempt = Attempt::new(request);
        let mut state = CheckState::Navigating;

        while !state.is_final() {
            tracing::trace!(?state, "check state");
            state = match self.step(page, state, &mut attempt).await {
                Ok(next) => next,
                Err(fault) => {
                    tracing::error!(?state, error = %fault, "check failed");
                    attempt.fail(CheckStatus::Error, FailureKind::Fault, fault.to_string());
                    CheckState::Failed
                }
            };
        }

        let reason = match (attempt.gap_note(), attempt.reason.take()) {
            (Some(gap), Some(reason)) => Some(format!("{gap}; {reason}")),
            (gap, reason) => gap.or(reason),
        };
        tracing::info!(
            status = %attempt.status,
            reason = reason.as_deref().unwrap_or(""),
            "check finished"
        );

        CheckOutcome {
            request_id: request.id().to_string(),
            listing_url: request.listing_url().to_string(),
            status: attempt.status,
            reason,
            failure: attempt.failure,
            attempted: attempt.attempted,
            gaps: attempt.gaps,
            attempts: 1,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn step<P: ListingPage + ?Sized>(
        &self,
        page: &mut P,
        state: CheckState,
        attempt: &mut Attempt<'_>,
    ) -> Result<CheckState, PageError> {
        let timings = &self.config.timings;
        match state {
            CheckState::Navigating => {
                let request = attempt.request;
                let url = request.listing_url();
                let nav = page
                    .goto(url, Timings::ms(timings.navigation_timeout_ms))
                    .await?;
                match nav {
                    Navigation::Challenged { marker } => {
                        tracing::warn!(url, %marker, "bot challenge encountered");
                        attempt.fail(
                            CheckStatus::Blocked,
                            FailureKind::ChallengeDetected,
                            format!("bot challenge encountered ({marker})"),
                        );
                        Ok(CheckState::Challenged)
                    }
                    Navigation::Loaded { final_url } => {
                        tracing::debug!(%final_url, "listing loaded");
                        if !page
                            .wait_for_settle(Timings::ms(timings.settle_timeout_ms))
                            .await?
                        {
                            tracing::debug!("listing not idle after load, continuing");
                        }
                        pause(timings.post_navigation_delay_ms).await;
                        Ok(CheckState::Discovering)
                    }
                }
            }

            CheckState::Discovering => {
                attempt.groups = discover_groups(page, &self.config.keywords).await?;
                Ok(CheckState::Resolving)
            }

            CheckState::Resolving => {
                let resolution = resolve(
                    &attempt.groups,
                    attempt.request,
                    &self.config.keywords,
                    self.config.positional_fallback,
                );
                for gap in &resolution.gaps {
                    tracing::warn!(dimension = %gap.dimension, value = %gap.value, "resolution gap");
                }
                attempt.assignments = resolution.assignments;
                attempt.gaps = resolution.gaps;
                if attempt.assignments.is_empty() {
                    Ok(CheckState::Evaluating)
                } else {
                    Ok(CheckState::Selecting(0))
                }
            }

            CheckState::Selecting(i) => {
                let assignment = attempt.assignments[i].clone();
                let group = attempt
                    .group_at(assignment.position)
                    .cloned()
                    .ok_or(PageError::UnknownGroup(assignment.position))?;
                attempt.attempted.push(assignment.clone());

                let outcome = select(
                    page,
                    &group,
                    &assignment.value,
                    &self.matcher,
                    &self.config.disabled,
                    timings,
                )
                .await?;

                match outcome {
                    SelectionOutcome::Selected { label, rule } => {
                        tracing::debug!(
                            dimension = %assignment.dimension,
                            %label,
                            rule = rule.name(),
                            "option selected"
                        );
                        if i + 1 < attempt.assignments.len() {
                            Ok(CheckState::Selecting(i + 1))
                        } else {
                            Ok(CheckState::Evaluating)
                        }
                    }
                    SelectionOutcome::Failed(failure) => {
                        self.record_selection_failure(attempt, &assignment, failure);
                        Ok(CheckState::Failed)
                    }
                }
            }

            CheckState::Evaluating => {
                if !attempt.attempted.is_empty() {
                    wait_for_quiescence(page, timings).await?;
                }
                pause(timings.pre_evaluation_delay_ms).await;
                let verdict = evaluate(page, &self.config.availability, timings).await;
                attempt.status = verdict.status;
                attempt.reason = verdict.detail;
                Ok(CheckState::Done)
            }

            CheckState::Done | CheckState::Challenged | CheckState::Failed => Ok(state),
        }
    }

    fn record_selection_failure(
        &self,
        attempt: &mut Attempt<'_>,
        assignment: &DimensionAssignment,
        failure: SelectionFailure,
    ) {
        tracing::info!(
            dimension = %assignment.dimension,
            value = %assignment.value,
            reason = %failure.reason(),
            "selection stopped the check"
        );
        attempt.fail(failure.status(), failure.kind(), failure.reason());
    }
}
