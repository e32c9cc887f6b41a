//! [`Driver`] over a stealth Chrome launched by `eoka`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use eoka::cdp::{MouseButton, MouseEventType};
use eoka::{Browser, Page};
use tracing::debug;

use super::{Driver, LoadState, Viewport};
use crate::config::BrowserConfig;
use crate::{Error, Result};

/// Quiet window that counts as network idle.
const NETWORK_IDLE_MS: u64 = 500;

/// Poll interval for `document.readyState`.
const READY_POLL_MS: u64 = 50;

/// Gap between mouse press and release.
const PRESS_HOLD_MS: u64 = 40;

const VIEWPORT_JS: &str =
    "JSON.stringify({ width: window.innerWidth, height: window.innerHeight })";

struct ChromeSession {
    browser: Browser,
    page: Page,
}

/// Lazily launched Chrome with a single page.
pub struct ChromeDriver {
    config: BrowserConfig,
    session: Option<ChromeSession>,
}

impl ChromeDriver {
    /// Create a driver. The browser is launched on first use.
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: config.clone(),
            session: None,
        }
    }

    /// The underlying page, if launched.
    pub fn page(&self) -> Option<&Page> {
        self.session.as_ref().map(|s| &s.page)
    }

    fn require_page(&self) -> Result<&Page> {
        self.page()
            .ok_or_else(|| Error::PageNotReady("browser not launched, navigate first".into()))
    }
}

#[async_trait(?Send)]
impl Driver for ChromeDriver {
    fn has_page(&self) -> bool {
        self.session.is_some()
    }

    async fn ensure_page(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let stealth = eoka::StealthConfig {
            headless: self.config.headless,
            proxy: self.config.proxy.clone(),
            user_agent: self.config.user_agent.clone(),
            viewport_width: self.config.viewport.width,
            viewport_height: self.config.viewport.height,
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, viewport: {}x{})",
            self.config.headless, self.config.viewport.width, self.config.viewport.height
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;
        self.session = Some(ChromeSession { browser, page });
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.require_page()?.goto(url).await?;
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<()> {
        let session = self.require_page()?.session();
        session
            .dispatch_mouse_event(MouseEventType::MouseMoved, x, y, None, None)
            .await?;
        session
            .dispatch_mouse_event(MouseEventType::MousePressed, x, y, Some(MouseButton::Left), Some(1))
            .await?;
        tokio::time::sleep(Duration::from_millis(PRESS_HOLD_MS)).await;
        session
            .dispatch_mouse_event(MouseEventType::MouseReleased, x, y, Some(MouseButton::Left), Some(1))
            .await?;
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<()> {
        self.require_page()?.type_text(text).await?;
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        self.require_page()?.human().press_key(key).await?;
        Ok(())
    }

    async fn scroll_by(&mut self, x: f64, y: f64, dx: i64, dy: i64) -> Result<()> {
        self.require_page()?
            .session()
            .dispatch_mouse_wheel(x, y, dx as f64, dy as f64)
            .await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<String> {
        let json: String = self.require_page()?.evaluate(script).await?;
        Ok(json)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(self.require_page()?.screenshot().await?)
    }

    async fn viewport(&mut self) -> Result<Viewport> {
        let json: String = self.require_page()?.evaluate(VIEWPORT_JS).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn wait_for_load_state(&mut self, state: LoadState, timeout_ms: u64) -> Result<()> {
        let page = self.require_page()?;
        if state == LoadState::NetworkIdle {
            return page
                .wait_for_network_idle(NETWORK_IDLE_MS, timeout_ms)
                .await
                .map_err(|e| {
                    debug!("network idle wait ended: {}", e);
                    Error::SettleTimeout { state, timeout_ms }
                });
        }
        poll_ready_state(|| page.evaluate::<String>("document.readyState"), state, timeout_ms).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            drop(session.page);
            session.browser.close().await?;
        }
        Ok(())
    }
}

/// Poll `ready_state` until it reports `state` or `timeout_ms` passes.
///
/// A failed read (the execution context torn down by a navigation, say)
/// counts as not ready yet.
async fn poll_ready_state<F, Fut, E>(mut ready_state: F, state: LoadState, timeout_ms: u64) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<String, E>>,
    E: Display,
{
    let poll = async {
        loop {
            match ready_state().await {
                Ok(ready) if state.reached_by(&ready) => return,
                Ok(_) => {}
                Err(e) => debug!("readyState unavailable: {}", e),
            }
            tokio::time::sleep(Duration::from_millis(READY_POLL_MS)).await;
        }
    };
    tokio::time::timeout(Duration::from_millis(timeout_ms), poll)
        .await
        .map_err(|_| Error::SettleTimeout { state, timeout_ms })
}
