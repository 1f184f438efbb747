// Copyright 2026 Stockcheck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Stockcheck engine: decides whether a requested (size, colour, ...)
//! combination is purchasable on a rendered listing page.
//!
//! The engine never talks to a browser directly. Everything it needs from
//! the page goes through the [`ListingPage`] capability, which the runtime
//! implements on top of Chromium and [`testing::FakePage`] implements in
//! memory.
//!
//! Flow for one listing: navigate → [`discovery`] → [`resolver`] →
//! [`selection`] (page order) → [`availability`], driven by the state
//! machine in [`orchestrator`].

pub mod availability;
pub mod config;
pub mod discovery;
pub mod matcher;
pub mod orchestrator;
pub mod page;
pub mod resolver;
pub mod retry;
pub mod selection;
pub mod sink;
pub mod testing;
pub mod types;

pub use availability::{evaluate, Verdict};
pub use config::{AvailabilityConfig, DimensionKeywords, DimensionRule, EngineConfig, Timings};
pub use discovery::discover_groups;
pub use matcher::{matches, normalize, MatchRule, OptionMatcher};
pub use orchestrator::{CheckState, ListingChecker};
pub use page::{
    Generation, GroupHandle, GroupSnapshot, ListingPage, Navigation, PageError, SignalKind,
    SignalReading, SignalSource,
};
pub use resolver::{resolve, Resolution};
pub use retry::{check_with_retries, RetryPolicy};
pub use selection::{select, DisabledSignal, SelectionFailure, SelectionOutcome};
pub use sink::{MemorySink, OutcomeSink};
pub use types::*;
