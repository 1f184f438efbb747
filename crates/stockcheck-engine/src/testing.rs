//! In-memory [`ListingPage`] for tests and dry runs.
//!
//! `FakePage` serves a fixed set of groups, records every call the engine
//! makes, and lets tests script navigation results and availability readings.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::page::{
    Generation, GroupHandle, GroupSnapshot, ListingPage, Navigation, PageError, SignalReading,
    SignalSource,
};
use crate::types::OptionEntry;

/// One call made against a [`FakePage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Goto(String),
    Settle,
    Snapshot,
    Open(String),
    ListOptions(String),
    Choose(String, String),
    Dismiss(String),
    ReadSignal,
}

/// An option inside a [`FakeGroup`].
#[derive(Debug, Clone, Default)]
pub struct FakeOption {
    value: Option<String>,
    label: String,
    disabled_marker: bool,
    class_list: String,
    not_interactable: bool,
}

impl FakeOption {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            class_list: "listbox__option".to_string(),
            ..Self::default()
        }
    }

    pub fn value(mut self, token: &str) -> Self {
        self.value = Some(token.to_string());
        self
    }

    pub fn aria_disabled(mut self) -> Self {
        self.disabled_marker = true;
        self
    }

    pub fn disabled_class(mut self) -> Self {
        self.class_list.push_str(" listbox__option--disabled");
        self
    }

    pub fn not_interactable(mut self) -> Self {
        self.not_interactable = true;
        self
    }
}

/// A variant group served by a [`FakePage`].
#[derive(Debug, Clone)]
pub struct FakeGroup {
    label: Option<String>,
    options: Vec<FakeOption>,
}

impl FakeGroup {
    pub fn new(label: &str, options: Vec<FakeOption>) -> Self {
        Self {
            label: Some(label.to_string()),
            options,
        }
    }

    pub fn unlabeled(options: Vec<FakeOption>) -> Self {
        Self {
            label: None,
            options,
        }
    }

    fn name(&self) -> String {
        self.label.clone().unwrap_or_default()
    }
}

/// Scripted page.
#[derive(Debug, Default)]
pub struct FakePage {
    generation: Generation,
    groups: Vec<FakeGroup>,
    open: Option<usize>,
    challenge: Option<String>,
    navigation_error: Option<PageError>,
    never_settles: bool,
    signal_results: VecDeque<Result<Option<SignalReading>, PageError>>,
    calls: Vec<PageCall>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group; groups render in the order they are added.
    pub fn with_group(mut self, group: FakeGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Queue an availability reading. Once the queue is empty, no signal is found.
    pub fn with_signal_result(mut self, result: Result<Option<SignalReading>, PageError>) -> Self {
        self.signal_results.push_back(result);
        self
    }

    /// Every navigation lands on a bot challenge.
    pub fn challenged(mut self, marker: &str) -> Self {
        self.challenge = Some(marker.to_string());
        self
    }

    /// Every navigation fails with `error`.
    pub fn fail_navigation(mut self, error: PageError) -> Self {
        self.navigation_error = Some(error);
        self
    }

    /// Settle waits always time out.
    pub fn never_settles(mut self) -> Self {
        self.never_settles = true;
        self
    }

    pub fn calls(&self) -> &[PageCall] {
        &self.calls
    }

    /// `(group label, option label)` for every selection made.
    pub fn chosen(&self) -> Vec<(String, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PageCall::Choose(group, option) => Some((group.clone(), option.clone())),
                _ => None,
            })
            .collect()
    }

    fn group(&self, handle: &GroupHandle) -> Result<&FakeGroup, PageError> {
        if handle.generation != self.generation {
            return Err(PageError::StaleHandle {
                handle: handle.generation,
                current: self.generation,
            });
        }
        self.groups
            .get(handle.slot)
            .ok_or(PageError::UnknownGroup(handle.slot))
    }

    fn open_group_checked(&self, handle: &GroupHandle) -> Result<&FakeGroup, PageError> {
        let group = self.group(handle)?;
        if self.open != Some(handle.slot) {
            return Err(PageError::Script(format!(
                "option list of '{}' is not open",
                group.name()
            )));
        }
        Ok(group)
    }
}

#[async_trait]
impl ListingPage for FakePage {
    fn generation(&self) -> Generation {
        self.generation
    }

    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<Navigation, PageError> {
        self.calls.push(PageCall::Goto(url.to_string()));
        self.generation = self.generation.next();
        self.open = None;
        if let Some(error) = &self.navigation_error {
            return Err(error.clone());
        }
        if let Some(marker) = &self.challenge {
            return Ok(Navigation::Challenged {
                marker: marker.clone(),
            });
        }
        Ok(Navigation::Loaded {
            final_url: url.to_string(),
        })
    }

    async fn wait_for_settle(&mut self, _timeout: Duration) -> Result<bool, PageError> {
        self.calls.push(PageCall::Settle);
        Ok(!self.never_settles)
    }

    async fn group_snapshots(&mut self) -> Result<Vec<GroupSnapshot>, PageError> {
        self.calls.push(PageCall::Snapshot);
        Ok(self
            .groups
            .iter()
            .enumerate()
            .map(|(slot, g)| GroupSnapshot {
                label: g.label.clone(),
                position: slot,
                handle: GroupHandle {
                    generation: self.generation,
                    slot,
                },
            })
            .collect())
    }

    async fn open_group(&mut self, handle: &GroupHandle) -> Result<(), PageError> {
        let name = self.group(handle)?.name();
        self.calls.push(PageCall::Open(name));
        self.open = Some(handle.slot);
        Ok(())
    }

    async fn list_options(&mut self, handle: &GroupHandle) -> Result<Vec<OptionEntry>, PageError> {
        let group = self.open_group_checked(handle)?;
        let name = group.name();
        let options = group
            .options
            .iter()
            .enumerate()
            .map(|(index, o)| OptionEntry {
                index,
                value: o.value.clone(),
                label: o.label.clone(),
                disabled_marker: o.disabled_marker,
                class_list: o.class_list.clone(),
            })
            .collect();
        self.calls.push(PageCall::ListOptions(name));
        Ok(options)
    }

    async fn choose_option(&mut self, handle: &GroupHandle, index: usize) -> Result<(), PageError> {
        let group = self.open_group_checked(handle)?;
        let name = group.name();
        let option = group
            .options
            .get(index)
            .ok_or_else(|| PageError::Script(format!("no option {index} in '{name}'")))?;
        if option.not_interactable {
            return Err(PageError::NotInteractable(format!(
                "timeout clicking '{}'",
                option.label
            )));
        }
        let label = option.label.clone();
        self.calls.push(PageCall::Choose(name, label));
        self.open = None;
        Ok(())
    }

    async fn dismiss(&mut self, handle: &GroupHandle) -> Result<(), PageError> {
        let name = self.group(handle)?.name();
        self.calls.push(PageCall::Dismiss(name));
        self.open = None;
        Ok(())
    }

    async fn read_availability(
        &mut self,
        _sources: &[SignalSource],
    ) -> Result<Option<SignalReading>, PageError> {
        self.calls.push(PageCall::ReadSignal);
        self.signal_results.pop_front().unwrap_or(Ok(None))
    }
}
