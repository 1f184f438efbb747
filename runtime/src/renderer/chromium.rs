//! Chromium-backed listing pages using chromiumoxide.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use stockcheck_engine::page::ensure_current;
use stockcheck_engine::{
    Generation, GroupHandle, GroupSnapshot, ListingPage, Navigation, OptionEntry, PageError,
    SignalReading, SignalSource,
};
use tokio::sync::Mutex;

use super::{scripts, Renderer};
use crate::config::{state_dir, RuntimeConfig};

/// Env var pointing at a Chromium binary.
pub const CHROMIUM_ENV: &str = "STOCKCHECK_CHROMIUM_PATH";

/// Interval between activity polls while waiting for the page to settle.
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    // 1. STOCKCHECK_CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. chromium_path from config
    if let Some(path) = configured.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }

    // 3. ~/.stockcheck/chromium/
    let base = state_dir().join("chromium");
    let candidates = if cfg!(target_os = "macos") {
        vec![
            base.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            base.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            base.join("chrome"),
        ]
    } else {
        vec![base.join("chrome-linux64/chrome"), base.join("chrome")]
    };
    if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
        return Some(found);
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Split a `name=value; name2=value2` header into pairs. Chunks without `=`
/// are ignored.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|chunk| {
            let (name, value) = chunk.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Map a CDP failure onto the engine's fault kinds.
fn page_error(e: impl std::fmt::Display) -> PageError {
    let msg = e.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("context was destroyed")
        || lowered.contains("cannot find context")
        || lowered.contains("navigated or closed")
    {
        PageError::Invalidated(msg)
    } else {
        PageError::Browser(msg)
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    active_count: Arc<AtomicUsize>,
    challenge_markers: Vec<String>,
    cookies: Vec<(String, String)>,
    cookie_domain: String,
}

impl ChromiumRenderer {
    /// Launch Chromium as described by `config`.
    pub async fn launch(config: &RuntimeConfig) -> Result<Self> {
        let chrome_path = find_chromium(config.chromium_path.as_deref()).context(
            "Chromium not found. Set STOCKCHECK_CHROMIUM_PATH or chromium_path in the config.",
        )?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1366, 900)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--lang=en-GB");
        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        if let Some(dir) = &config.profile_dir {
            builder = builder.user_data_dir(dir);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let cookies = config
            .cookie
            .as_deref()
            .map(parse_cookie_header)
            .unwrap_or_default();
        tracing::info!(
            headless = config.headless,
            cookies = cookies.len(),
            "Chromium launched"
        );

        Ok(Self {
            browser: Mutex::new(browser),
            active_count: Arc::new(AtomicUsize::new(0)),
            challenge_markers: config
                .challenge_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            cookies,
            cookie_domain: config.cookie_domain.clone(),
        })
    }

    fn cookie_params(&self) -> Result<Vec<CookieParam>> {
        self.cookies
            .iter()
            .map(|(name, value)| {
                CookieParam::builder()
                    .name(name.clone())
                    .value(value.clone())
                    .domain(self.cookie_domain.clone())
                    .path("/")
                    .build()
                    .map_err(|e| anyhow::anyhow!("invalid cookie '{name}': {e}"))
            })
            .collect()
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_page(&self) -> Result<Box<dyn ListingPage>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        if !self.cookies.is_empty() {
            page.set_cookies(self.cookie_params()?)
                .await
                .context("failed to install cookies")?;
        }

        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ChromiumPage {
            page,
            generation: Generation::default(),
            slots: 0,
            challenge_markers: self.challenge_markers.clone(),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

#[derive(Deserialize)]
struct Ack {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl Ack {
    fn reason(self) -> String {
        self.reason.unwrap_or_else(|| "script reported failure".into())
    }
}

#[derive(Deserialize)]
struct RawGroup {
    label: Option<String>,
    kind: String,
}

#[derive(Deserialize)]
struct Discovered {
    groups: Vec<RawGroup>,
}

#[derive(Deserialize)]
struct OptionList {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
    options: Vec<OptionEntry>,
}

#[derive(Deserialize)]
struct SignalRead {
    reading: Option<SignalReading>,
}

#[derive(Deserialize)]
struct Challenge {
    marker: Option<String>,
}

#[derive(Deserialize, PartialEq)]
struct Activity {
    ready: String,
    resources: u64,
}

/// One Chromium tab driving a listing.
pub struct ChromiumPage {
    page: Page,
    generation: Generation,
    /// Groups registered by the last discovery on this generation.
    slots: usize,
    challenge_markers: Vec<String>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, PageError> {
        let result = self.page.evaluate(script).await.map_err(page_error)?;
        result
            .into_value()
            .map_err(|e| PageError::Script(format!("unexpected script result: {e:?}")))
    }

    fn check(&self, handle: &GroupHandle) -> Result<(), PageError> {
        ensure_current(self, handle)?;
        if handle.slot >= self.slots {
            return Err(PageError::UnknownGroup(handle.slot));
        }
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl ListingPage for ChromiumPage {
    fn generation(&self) -> Generation {
        self.generation
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<Navigation, PageError> {
        self.generation = self.generation.next();
        self.slots = 0;

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(page_error(format!("navigation failed: {e}"))),
            Err(_) => {
                return Err(PageError::Timeout {
                    what: "navigation".into(),
                    after_ms: timeout.as_millis() as u64,
                })
            }
        }

        let challenge: Challenge = self
            .eval(&scripts::detect_challenge(&self.challenge_markers))
            .await?;
        if let Some(marker) = challenge.marker {
            return Ok(Navigation::Challenged { marker });
        }

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        Ok(Navigation::Loaded { final_url })
    }

    async fn wait_for_settle(&mut self, timeout: Duration) -> Result<bool, PageError> {
        let deadline = Instant::now() + timeout;
        let mut previous: Option<Activity> = None;
        while Instant::now() < deadline {
            match self.eval::<Activity>(scripts::ACTIVITY).await {
                Ok(now) => {
                    if now.ready == "complete" && previous.as_ref() == Some(&now) {
                        return Ok(true);
                    }
                    previous = Some(now);
                }
                // A late re-render replaced the document; keep polling the new one.
                Err(e) if e.is_invalidation() => previous = None,
                Err(e) => return Err(e),
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
        Ok(false)
    }

    async fn group_snapshots(&mut self) -> Result<Vec<GroupSnapshot>, PageError> {
        let discovered: Discovered = self.eval(&scripts::discover_groups()).await?;
        self.slots = discovered.groups.len();
        let generation = self.generation;
        Ok(discovered
            .groups
            .into_iter()
            .enumerate()
            .map(|(slot, g)| {
                tracing::trace!(slot, kind = %g.kind, label = ?g.label, "group found");
                GroupSnapshot {
                    label: g.label,
                    position: slot,
                    handle: GroupHandle { generation, slot },
                }
            })
            .collect())
    }

    async fn open_group(&mut self, handle: &GroupHandle) -> Result<(), PageError> {
        self.check(handle)?;
        let ack: Ack = self.eval(&scripts::open_group(handle.slot)).await?;
        if !ack.ok {
            return Err(PageError::Script(ack.reason()));
        }
        Ok(())
    }

    async fn list_options(&mut self, handle: &GroupHandle) -> Result<Vec<OptionEntry>, PageError> {
        self.check(handle)?;
        let list: OptionList = self.eval(&scripts::list_options(handle.slot)).await?;
        if !list.ok {
            return Err(PageError::Script(
                list.reason.unwrap_or_else(|| "options unreadable".into()),
            ));
        }
        Ok(list.options)
    }

    async fn choose_option(&mut self, handle: &GroupHandle, index: usize) -> Result<(), PageError> {
        self.check(handle)?;
        let ack: Ack = self
            .eval(&scripts::choose_option(handle.slot, index))
            .await?;
        if !ack.ok {
            return Err(PageError::NotInteractable(ack.reason()));
        }
        Ok(())
    }

    async fn dismiss(&mut self, handle: &GroupHandle) -> Result<(), PageError> {
        self.check(handle)?;
        let _: Ack = self.eval(&scripts::dismiss(handle.slot)).await?;
        Ok(())
    }

    async fn read_availability(
        &mut self,
        sources: &[SignalSource],
    ) -> Result<Option<SignalReading>, PageError> {
        let read: SignalRead = self.eval(&scripts::read_availability(sources)).await?;
        Ok(read.reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockcheck_engine::{CheckStatus, ListingChecker, VariantRequest};

    #[test]
    fn test_parse_cookie_header() {
        let pairs = parse_cookie_header("s=abc; nonsession=x=y ;; broken; =empty");
        assert_eq!(
            pairs,
            [
                ("s".to_string(), "abc".to_string()),
                ("nonsession".to_string(), "x=y".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalidation_errors_are_recognized() {
        assert!(page_error("Execution context was destroyed.").is_invalidation());
        assert!(!page_error("Target crashed").is_invalidation());
    }

    const LISTING: &str = r#"<html><body>
<div class="vim x-sku"><span class="listbox-button">
  <button class="listbox-button__control" aria-haspopup="listbox"><span class="btn__label">Colour:</span></button>
  <div class="listbox__options">
    <div class="listbox__option" data-sku-value-name="Grey - Greekey">Grey - Greekey</div>
    <div class="listbox__option listbox__option--disabled" data-sku-value-name="Navy">Navy</div>
  </div></span></div>
<div class="vim x-sku"><span class="listbox-button">
  <button class="listbox-button__control" aria-haspopup="listbox"><span class="btn__label">Size:</span></button>
  <div class="listbox__options">
    <div class="listbox__option" data-sku-value-name="80 x 150 cm">80 x 150 cm (2 ft 7 in x 4 ft 11 in)</div>
  </div></span></div>
<div id="qtySubTxt">More than 10 available</div>
</body></html>"#;

    /// Choosing a colour swaps the size widget for a fresh copy of itself.
    const RERENDERING_LISTING: &str = r#"<script>
document.addEventListener('click', e => {
  if (!e.target.closest('[data-sku-value-name]')) return;
  if (!e.target.closest('div.vim.x-sku').querySelector('.btn__label').innerText.startsWith('Colour')) return;
  const size = document.querySelectorAll('div.vim.x-sku')[1];
  size.replaceWith(size.cloneNode(true));
});
</script>"#;

    fn data_url(html: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(html.as_bytes()).collect();
        format!("data:text/html,{}", encoded.replace('+', "%20"))
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_checks_fixture_listing() {
        let config = RuntimeConfig::default();
        let renderer = ChromiumRenderer::launch(&config)
            .await
            .expect("failed to launch Chromium");
        let mut page = renderer.new_page().await.expect("failed to open page");
        let checker = ListingChecker::new(config.engine.clone());
        let url = data_url(LISTING);

        let req = VariantRequest::new(
            "ok",
            url.clone(),
            [("size", "80 x 150 cm"), ("variation", "Grey")],
        )
        .unwrap();
        let outcome = checker.check_listing(page.as_mut(), &req).await;
        assert_eq!(outcome.status, CheckStatus::InStock, "{outcome:?}");

        let req = VariantRequest::new("navy", url, [("variation", "Navy")]).unwrap();
        let outcome = checker.check_listing(page.as_mut(), &req).await;
        assert_eq!(outcome.status, CheckStatus::OutOfStock, "{outcome:?}");

        drop(page);
        assert_eq!(renderer.active_pages(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_survives_widget_rerender() {
        let config = RuntimeConfig::default();
        let renderer = ChromiumRenderer::launch(&config)
            .await
            .expect("failed to launch Chromium");
        let mut page = renderer.new_page().await.expect("failed to open page");
        let checker = ListingChecker::new(config.engine.clone());
        let html = LISTING.replace("</body>", &format!("{RERENDERING_LISTING}</body>"));

        let req = VariantRequest::new(
            "rerender",
            data_url(&html),
            [("size", "80 x 150 cm"), ("variation", "Grey")],
        )
        .unwrap();
        let outcome = checker.check_listing(page.as_mut(), &req).await;
        assert_eq!(outcome.status, CheckStatus::InStock, "{outcome:?}");
        assert_eq!(outcome.attempted.len(), 2, "{outcome:?}");

        drop(page);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
