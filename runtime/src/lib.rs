// Copyright 2026 Stockcheck Contributors
// SPDX-License-Identifier: Apache-2.0

//! Stockcheck runtime: drives the variant-resolution engine against real
//! listing pages in Chromium and persists the outcomes.
//!
//! This library crate exposes the runtime modules to the binary and to
//! integration tests.

pub mod cli;
pub mod config;
pub mod input;
pub mod logging;
pub mod renderer;
pub mod runner;
pub mod sink;
