//! Browser boundary: the primitive operations the agent needs from a page.

mod chrome;

pub use chrome::ChromeDriver;

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::Result;

/// Page load milestones that capture waits for, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// `DOMContentLoaded` fired (`document.readyState` is past `loading`).
    ContentLoaded,
    /// `load` fired (`document.readyState == "complete"`).
    Load,
    /// No network activity for a short quiet window.
    NetworkIdle,
}

impl LoadState {
    pub const ALL: [LoadState; 3] = [LoadState::ContentLoaded, LoadState::Load, LoadState::NetworkIdle];

    /// Whether a `document.readyState` value means this state was reached.
    /// Network idleness can't be read from `readyState`; only `complete`
    /// is accepted as a lower bound for it.
    pub fn reached_by(&self, ready_state: &str) -> bool {
        match self {
            LoadState::ContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadState::Load | LoadState::NetworkIdle => ready_state == "complete",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::ContentLoaded => "domcontentloaded",
            LoadState::Load => "load",
            LoadState::NetworkIdle => "networkidle",
        })
    }
}

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Map fractions of the viewport to whole pixels, truncating toward zero.
    pub fn to_pixels(&self, fx: f64, fy: f64) -> (i64, i64) {
        (
            (self.width as f64 * fx) as i64,
            (self.height as f64 * fy) as i64,
        )
    }
}

/// One browser page, owned by a single executor.
///
/// Every call except [`ensure_page`](Driver::ensure_page) and
/// [`has_page`](Driver::has_page) fails with
/// [`Error::PageNotReady`](crate::Error::PageNotReady) when no page exists.
#[async_trait(?Send)]
pub trait Driver {
    /// Whether a live page exists.
    fn has_page(&self) -> bool;

    /// Launch the browser and open a page if there isn't one yet.
    async fn ensure_page(&mut self) -> Result<()>;

    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Pointer click at a viewport point.
    async fn click_at(&mut self, x: f64, y: f64) -> Result<()>;

    /// Send text as individual keystrokes to the focused element.
    async fn type_text(&mut self, text: &str) -> Result<()>;

    /// Press a named key or chord ("Enter", "Alt+ArrowLeft").
    async fn press_key(&mut self, key: &str) -> Result<()>;

    /// Wheel-scroll by a pixel delta with the pointer at `(x, y)`. Whatever
    /// scrolls under the pointer takes the delta.
    async fn scroll_by(&mut self, x: f64, y: f64, dx: i64, dy: i64) -> Result<()>;

    /// Evaluate a script that returns a JSON string.
    async fn evaluate(&mut self, script: &str) -> Result<String>;

    /// Viewport screenshot as PNG bytes.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    async fn viewport(&mut self) -> Result<Viewport>;

    /// Wait until `state` is reached. Fails with
    /// [`Error::SettleTimeout`](crate::Error::SettleTimeout) after `timeout_ms`.
    async fn wait_for_load_state(&mut self, state: LoadState, timeout_ms: u64) -> Result<()>;

    /// Close the page and browser. A later `ensure_page` starts fresh.
    async fn close(&mut self) -> Result<()>;
}
