//! Caller-level retry for listing checks.
//!
//! The orchestrator never retries internally. Callers re-issue a fresh
//! attempt when the outcome is retryable:
//!
//! - `BLOCKED` (bot challenge): waits `2 × delay` before the next attempt.
//! - `ERROR` from a collaborator fault: waits `delay`.
//!
//! Selection failures (value not found, option disabled) are final. Each
//! retry replaces the previous outcome wholesale.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::ListingChecker;
use crate::page::ListingPage;
use crate::types::{CheckOutcome, FailureKind, VariantRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 3_000,
        }
    }
}

impl RetryPolicy {
    /// Pause before retrying after `outcome`.
    pub fn backoff(&self, outcome: &CheckOutcome) -> Duration {
        let factor = match outcome.failure {
            Some(FailureKind::ChallengeDetected) => 2,
            _ => 1,
        };
        Duration::from_millis(self.delay_ms.saturating_mul(factor))
    }
}

/// Check `request`, retrying retryable outcomes up to `policy.max_retries`
/// times. The returned outcome is the last attempt's, with `attempts` set to
/// the number of attempts made.
pub async fn check_with_retries<P: ListingPage + ?Sized>(
    checker: &ListingChecker,
    page: &mut P,
    request: &VariantRequest,
    policy: &RetryPolicy,
) -> CheckOutcome {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let mut outcome = checker.check_listing(page, request).await;
        outcome.attempts = attempts;

        if !outcome.is_retryable() {
            return outcome;
        }
        if attempts > policy.max_retries {
            tracing::error!(
                id = request.id(),
                attempts,
                status = %outcome.status,
                "max retries exceeded"
            );
            return outcome;
        }

        let wait = policy.backoff(&outcome);
        tracing::warn!(
            id = request.id(),
            attempt = attempts,
            status = %outcome.status,
            wait_ms = wait.as_millis() as u64,
            "retrying listing check"
        );
        tokio::time::sleep(wait).await;
    }
}
