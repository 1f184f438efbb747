//! Renderer abstraction for browser-backed listing pages.
//!
//! A `Renderer` owns the browser process and hands out pages. Each page is
//! exclusively owned by one worker for the whole batch.

pub mod chromium;
pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;
use stockcheck_engine::ListingPage;

/// A browser engine that can open listing pages.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new tab.
    async fn new_page(&self) -> Result<Box<dyn ListingPage>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of pages currently open.
    fn active_pages(&self) -> usize;
}
