//! Page-state capture: settle, extract, render.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::io::Reader as ImageReader;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::annotate::{self, encode_png, Region};
use crate::driver::{Driver, LoadState};
use crate::element::{Element, ElementView};
use crate::{observe, Result};

/// Per-state load wait limits in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettleTimeouts {
    pub content_loaded_ms: u64,
    pub load_ms: u64,
    pub network_idle_ms: u64,
}

impl SettleTimeouts {
    pub fn uniform(ms: u64) -> Self {
        Self {
            content_loaded_ms: ms,
            load_ms: ms,
            network_idle_ms: ms,
        }
    }

    pub fn for_state(&self, state: LoadState) -> u64 {
        match state {
            LoadState::ContentLoaded => self.content_loaded_ms,
            LoadState::Load => self.load_ms,
            LoadState::NetworkIdle => self.network_idle_ms,
        }
    }
}

impl Default for SettleTimeouts {
    fn default() -> Self {
        Self::uniform(30_000)
    }
}

/// How the executor captures observations.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub timeouts: SettleTimeouts,
    /// Write raw and annotated screenshots here when set.
    pub debug_dir: Option<PathBuf>,
}

/// What the oracle sees of the page at one point in time.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Extraction this observation was built from.
    pub generation: u64,
    /// Annotated, cropped screenshot (PNG).
    pub image: Vec<u8>,
    pub elements: Vec<ElementView>,
    /// Crop applied to the screenshot, in screenshot pixels.
    pub crop: Region,
}

impl Observation {
    pub fn image_base64(&self) -> String {
        BASE64.encode(&self.image)
    }

    /// One line per element: `[index] <tag> "text"`.
    pub fn element_list(&self) -> String {
        let mut out = String::with_capacity(self.elements.len() * 40);
        for el in &self.elements {
            out.push_str(&el.to_string());
            out.push('\n');
        }
        out
    }
}

/// Result of one capture: the observation plus the full elements the
/// executor needs to dispatch index clicks.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub observation: Observation,
    pub elements: Vec<Element>,
}

/// Wait for the page to settle, then extract and render.
///
/// Load-state timeouts are logged and skipped; the capture proceeds with
/// whatever the page shows.
pub async fn look<D: Driver + ?Sized>(
    driver: &mut D,
    options: &CaptureOptions,
    generation: u64,
) -> Result<Snapshot> {
    settle(driver, &options.timeouts).await?;

    let elements = observe::extract(driver, generation).await?;
    let screenshot = driver.screenshot().await?;
    let viewport = driver.viewport().await?;

    let (raw_width, _) = ImageReader::new(Cursor::new(&screenshot))
        .with_guessed_format()?
        .into_dimensions()?;
    let scale = if viewport.width > 0 {
        raw_width as f64 / viewport.width as f64
    } else {
        1.0
    };
    let rendered = annotate::render(&screenshot, &elements, scale)?;

    if let Some(ref dir) = options.debug_dir {
        persist_debug(dir, generation, &screenshot, &rendered.annotated, &rendered.png);
    }

    Ok(Snapshot {
        observation: Observation {
            generation,
            image: rendered.png,
            elements: elements.iter().map(Element::view).collect(),
            crop: rendered.crop,
        },
        elements,
    })
}

async fn settle<D: Driver + ?Sized>(driver: &mut D, timeouts: &SettleTimeouts) -> Result<()> {
    for state in LoadState::ALL {
        let timeout_ms = timeouts.for_state(state);
        match driver.wait_for_load_state(state, timeout_ms).await {
            Ok(()) => debug!("page reached {}", state),
            Err(e) if e.is_recoverable() => warn!("{}, capturing anyway", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn persist_debug(dir: &Path, generation: u64, raw: &[u8], annotated: &image::RgbaImage, cropped: &[u8]) {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let prefix = format!("screenshot_{}_{}", stamp, generation);

    let annotated = match encode_png(annotated) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to encode debug image: {}", e);
            return;
        }
    };
    let files = [
        ("raw", raw),
        ("annotated", annotated.as_slice()),
        ("cropped", cropped),
    ];

    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Failed to create debug dir {}: {}", dir.display(), e);
        return;
    }
    for (kind, bytes) in files {
        let path = dir.join(format!("{}_{}.png", prefix, kind));
        match std::fs::write(&path, bytes) {
            Ok(()) => debug!("Debug screenshot saved to {}", path.display()),
            Err(e) => warn!("Failed to save debug screenshot {}: {}", path.display(), e),
        }
    }
}
