//! Page elements as seen by one extraction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bounding box in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, used as the click target.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Same box with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

/// An interactive element, identified by index within one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Dense zero-based index in extraction order.
    pub index: usize,
    /// Extraction that produced this element. Indices from other
    /// generations refer to a different DOM.
    pub generation: u64,
    /// Unique CSS selector
    pub selector: String,
    pub xpath: String,
    pub bbox: BBox,
    /// Lowercase tag name
    pub tag: String,
    /// Visible text, truncated by the extraction script
    pub text: String,
}

impl Element {
    /// The reduced view handed to the oracle alongside the image.
    pub fn view(&self) -> ElementView {
        ElementView {
            index: self.index,
            tag: self.tag.clone(),
            text: self.text.clone(),
            xpath: self.xpath.clone(),
            bbox: self.bbox,
        }
    }

    pub fn reference(&self) -> ElementRef {
        ElementRef {
            generation: self.generation,
            index: self.index as i64,
        }
    }
}

/// Simplified element as carried by an [`Observation`](crate::Observation).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub index: usize,
    #[serde(rename = "tagName")]
    pub tag: String,
    pub text: String,
    pub xpath: String,
    pub bbox: BBox,
}

impl fmt::Display for ElementView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}>", self.index, self.tag)?;
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        Ok(())
    }
}

/// An index as chosen by the oracle, pinned to the observation it saw.
///
/// The index is signed because it comes straight off the wire; anything
/// outside `0..len` is handled by the executor's fallback click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRef {
    pub generation: u64,
    pub index: i64,
}
