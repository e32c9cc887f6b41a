//! Primitive browser actions. Each one settles the page and returns a fresh
//! observation.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::capture::{self, CaptureOptions, Observation};
use crate::driver::Driver;
use crate::element::{Element, ElementRef};
use crate::{Error, Result};

/// Key pressed by [`Executor::type_and_submit`].
pub const DEFAULT_SUBMIT_KEY: &str = "Enter";

/// Fixed waits after each kind of action, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub click_ms: u64,
    pub type_ms: u64,
    pub scroll_ms: u64,
}

impl SettleDelays {
    pub fn none() -> Self {
        Self {
            click_ms: 0,
            type_ms: 0,
            scroll_ms: 0,
        }
    }
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            click_ms: 5000,
            type_ms: 5000,
            scroll_ms: 1000,
        }
    }
}

/// Owns the browser page and the elements of the latest observation.
///
/// Index clicks are resolved against the elements captured by the most
/// recent observation only; every capture bumps the generation.
pub struct Executor<D> {
    driver: D,
    options: CaptureOptions,
    delays: SettleDelays,
    elements: Vec<Element>,
    generation: u64,
    pointer: (f64, f64),
}

impl<D: Driver> Executor<D> {
    pub fn new(driver: D, options: CaptureOptions) -> Self {
        Self {
            driver,
            options,
            delays: SettleDelays::default(),
            elements: Vec::new(),
            generation: 0,
            pointer: (0.0, 0.0),
        }
    }

    pub fn with_delays(mut self, delays: SettleDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Elements of the latest observation.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Generation of the latest observation (0 before the first capture).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last pointer position in viewport pixels.
    pub fn pointer(&self) -> (f64, f64) {
        self.pointer
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Load `url`, launching the browser first if needed.
    pub async fn navigate(&mut self, url: &str) -> Result<Observation> {
        self.driver.ensure_page().await?;
        info!("goto: {}", url);
        self.driver.goto(url).await?;
        self.look().await
    }

    /// Click the center of an element from the current observation.
    ///
    /// An index outside the observed range doesn't fail: it becomes a plain
    /// click at the current pointer position. A reference from an older
    /// observation is rejected with [`Error::StaleElement`].
    pub async fn click(&mut self, target: ElementRef) -> Result<Observation> {
        self.driver.ensure_page().await?;
        if target.generation != self.generation {
            return Err(Error::StaleElement {
                index: target.index,
                generation: target.generation,
                current: self.generation,
            });
        }

        let (x, y) = match self.resolve(target.index) {
            Ok(el) => {
                info!("click: [{}] <{}> \"{}\"", el.index, el.tag, el.text);
                el.bbox.center()
            }
            Err(e) if e.is_recoverable() => {
                warn!("{}, clicking at pointer instead", e);
                self.pointer
            }
            Err(e) => return Err(e),
        };
        self.pointer_click(x, y).await?;
        self.settle(self.delays.click_ms).await;
        self.look().await
    }

    /// Click at fractions of the viewport width and height.
    pub async fn click_at_fraction(&mut self, fx: f64, fy: f64) -> Result<Observation> {
        self.driver.ensure_page().await?;
        let (x, y) = self.driver.viewport().await?.to_pixels(fx, fy);
        info!("click at ({}, {})", x, y);
        self.pointer_click(x as f64, y as f64).await?;
        self.settle(self.delays.click_ms).await;
        self.look().await
    }

    /// Type `text` into the focused element, then press `press` if given.
    pub async fn type_text(&mut self, text: &str, press: Option<&str>) -> Result<Observation> {
        self.driver.ensure_page().await?;
        info!("type: {:?}{}", text, press.map(|k| format!(" + {}", k)).unwrap_or_default());
        if !text.is_empty() {
            self.driver.type_text(text).await?;
        }
        if let Some(key) = press {
            self.driver.press_key(key).await?;
        }
        self.settle(self.delays.type_ms).await;
        self.look().await
    }

    /// Type `text` and press [`DEFAULT_SUBMIT_KEY`].
    pub async fn type_and_submit(&mut self, text: &str) -> Result<Observation> {
        self.type_text(text, Some(DEFAULT_SUBMIT_KEY)).await
    }

    /// Wheel-scroll by fractions of the viewport at the last pointer
    /// position. The amount is relative to the current scroll position.
    pub async fn scroll(&mut self, fx: f64, fy: f64) -> Result<Observation> {
        self.driver.ensure_page().await?;
        let (dx, dy) = self.driver.viewport().await?.to_pixels(fx, fy);
        let (x, y) = self.pointer;
        info!("scroll by ({}, {}) at ({:.0}, {:.0})", dx, dy, x, y);
        self.driver.scroll_by(x, y, dx, dy).await?;
        self.settle(self.delays.scroll_ms).await;
        self.look().await
    }

    /// Capture the page as it is now.
    pub async fn look(&mut self) -> Result<Observation> {
        // Invalidate before capturing so a failed capture can't leave
        // old indices looking current.
        self.generation += 1;
        self.elements.clear();

        let snapshot = capture::look(&mut self.driver, &self.options, self.generation).await?;
        self.elements = snapshot.elements;
        Ok(snapshot.observation)
    }

    /// Close the browser.
    pub async fn close(&mut self) -> Result<()> {
        self.elements.clear();
        self.driver.close().await
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn resolve(&self, index: i64) -> Result<&Element> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.elements.get(i))
            .ok_or(Error::InvalidElementIndex {
                index,
                len: self.elements.len(),
            })
    }

    async fn pointer_click(&mut self, x: f64, y: f64) -> Result<()> {
        self.driver.click_at(x, y).await?;
        self.pointer = (x, y);
        Ok(())
    }

    async fn settle(&self, ms: u64) {
        if ms > 0 {
            debug!("settling for {}ms", ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}
