//! Outcome sinks: where finished checks go.

use std::collections::HashMap;
use std::convert::Infallible;

use crate::types::{CheckOutcome, CheckStatus};

/// Accepts one outcome per request. A later outcome for the same request id
/// replaces the earlier one.
pub trait OutcomeSink {
    type Error;

    fn record(&mut self, outcome: &CheckOutcome) -> Result<(), Self::Error>;
}

/// Keeps outcomes in memory, in first-recorded order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    outcomes: Vec<CheckOutcome>,
    index: HashMap<String, usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    pub fn get(&self, request_id: &str) -> Option<&CheckOutcome> {
        self.index.get(request_id).map(|&i| &self.outcomes[i])
    }

    /// Number of outcomes per status.
    pub fn counts(&self) -> HashMap<CheckStatus, usize> {
        let mut counts = HashMap::new();
        for outcome in &self.outcomes {
            *counts.entry(outcome.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn into_outcomes(self) -> Vec<CheckOutcome> {
        self.outcomes
    }
}

impl OutcomeSink for MemorySink {
    type Error = Infallible;

    fn record(&mut self, outcome: &CheckOutcome) -> Result<(), Infallible> {
        match self.index.get(&outcome.request_id) {
            Some(&i) => self.outcomes[i] = outcome.clone(),
            None => {
                self.index
                    .insert(outcome.request_id.clone(), self.outcomes.len());
                self.outcomes.push(outcome.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: CheckStatus) -> CheckOutcome {
        CheckOutcome {
            request_id: id.into(),
            listing_url: "https://example.com/itm/1".into(),
            status,
            reason: None,
            failure: None,
            attempted: Vec::new(),
            gaps: Vec::new(),
            attempts: 1,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_later_outcome_replaces_earlier() {
        let mut sink = MemorySink::new();
        sink.record(&outcome("a", CheckStatus::Error)).unwrap();
        sink.record(&outcome("b", CheckStatus::InStock)).unwrap();
        sink.record(&outcome("a", CheckStatus::OutOfStock)).unwrap();

        assert_eq!(sink.outcomes().len(), 2);
        assert_eq!(sink.outcomes()[0].request_id, "a");
        assert_eq!(sink.get("a").unwrap().status, CheckStatus::OutOfStock);
        assert_eq!(sink.counts().get(&CheckStatus::Error), None);
    }
}
