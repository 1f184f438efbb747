//! Availability evaluation: read the page-level signal once all
//! selections are made and turn it into a verdict.

use crate::config::{AvailabilityConfig, Timings};
use crate::page::{ListingPage, SignalReading};
use crate::selection::pause;
use crate::types::CheckStatus;

/// Status plus the text or signal it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// One of `IN_STOCK`, `OUT_OF_STOCK`, `UNKNOWN`.
    pub status: CheckStatus,
    pub detail: Option<String>,
}

impl Verdict {
    fn new(status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Classify a signal reading.
pub fn classify(reading: Option<&SignalReading>, config: &AvailabilityConfig) -> Verdict {
    match reading {
        Some(SignalReading::Text { text, .. }) => {
            let lowered = text.to_lowercase();
            let out = config
                .out_of_stock_phrases
                .iter()
                .any(|p| lowered.contains(&p.to_lowercase()));
            let status = if out {
                CheckStatus::OutOfStock
            } else {
                CheckStatus::InStock
            };
            Verdict::new(status, text.trim())
        }
        Some(SignalReading::PurchaseControl { disabled: true, .. }) => {
            Verdict::new(CheckStatus::OutOfStock, "purchase control disabled")
        }
        Some(SignalReading::PurchaseControl { disabled: false, .. }) => {
            Verdict::new(CheckStatus::InStock, "purchase control enabled")
        }
        None if config.strict => Verdict::new(CheckStatus::Unknown, "no availability signal"),
        None => Verdict {
            status: CheckStatus::InStock,
            detail: None,
        },
    }
}

/// Read the page signal and classify the first one found.
///
/// A failing read (typically a context destroyed by a late re-render) is
/// retried exactly once after a short pause. A second failure degrades to
/// the optimistic default with the fault text as detail; it is never
/// propagated.
pub async fn evaluate<P: ListingPage + ?Sized>(
    page: &mut P,
    config: &AvailabilityConfig,
    timings: &Timings,
) -> Verdict {
    let first = match page.read_availability(&config.sources).await {
        Ok(reading) => return classify(reading.as_ref(), config),
        Err(e) => e,
    };
    tracing::warn!(error = %first, "availability read failed, retrying once");
    pause(timings.evaluation_retry_delay_ms).await;

    match page.read_availability(&config.sources).await {
        Ok(reading) => classify(reading.as_ref(), config),
        Err(second) => {
            tracing::error!(error = %second, "availability read failed after retry");
            let status = if config.strict {
                CheckStatus::Unknown
            } else {
                CheckStatus::InStock
            };
            Verdict::new(
                status,
                format!("availability unreadable after retry: {second}"),
            )
        }
    }
}
