//! Screenshot annotation: draws a numbered box over every element, then
//! crops to the region the elements span.

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::element::{BBox, Element};
use crate::Result;

pub const BOX_COLOR: Rgba<u8> = Rgba([220, 38, 38, 255]);
pub const LABEL_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);
pub const LABEL_PLATE: Rgba<u8> = Rgba([255, 255, 255, 255]);

const BOX_STROKE: u32 = 2;
const GLYPH_SIZE: u32 = 8;
const LABEL_SCALE: u32 = 2;
const LABEL_PAD: u32 = 2;

/// Axis-aligned pixel rectangle on the screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Clamp a floating point box to a `width` x `height` canvas, rounding
    /// outward. `None` if nothing of it lands on the canvas.
    pub fn clamp_bbox(bbox: &BBox, width: u32, height: u32) -> Option<Region> {
        let x0 = bbox.x.max(0.0).floor();
        let y0 = bbox.y.max(0.0).floor();
        let x1 = bbox.right().min(width as f64).ceil();
        let y1 = bbox.bottom().min(height as f64).ceil();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Region {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    fn to_rect(self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height)
    }
}

/// An index label as drawn onto the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub index: usize,
    pub text: String,
    pub region: Region,
}

/// Output of [`render`].
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Cropped annotated image, PNG encoded.
    pub png: Vec<u8>,
    /// Full-size annotated image before cropping.
    pub annotated: RgbaImage,
    /// Crop rectangle in screenshot pixels.
    pub crop: Region,
    pub labels: Vec<Label>,
}

/// Annotate a PNG screenshot with `elements` and crop to their extent.
///
/// `scale` converts element boxes (CSS pixels) to screenshot pixels. With
/// no elements the screenshot comes back unchanged and uncropped.
pub fn render(screenshot_png: &[u8], elements: &[Element], scale: f64) -> Result<Rendered> {
    let mut canvas = image::load_from_memory(screenshot_png)?.to_rgba8();
    let (boxes, labels) = annotate(&mut canvas, elements, scale);
    let crop = crop_region(canvas.width(), canvas.height(), &boxes, &labels);

    let cropped = image::imageops::crop_imm(&canvas, crop.x, crop.y, crop.width, crop.height).to_image();
    let png = encode_png(&cropped)?;

    Ok(Rendered {
        png,
        annotated: canvas,
        crop,
        labels,
    })
}

/// Draw every on-canvas element's box and index label. Returns the drawn
/// box regions and labels, both in element order.
pub fn annotate(canvas: &mut RgbaImage, elements: &[Element], scale: f64) -> (Vec<Region>, Vec<Label>) {
    let (width, height) = canvas.dimensions();
    let mut boxes = Vec::with_capacity(elements.len());
    let mut labels = Vec::with_capacity(elements.len());

    for el in elements {
        let Some(region) = Region::clamp_bbox(&el.bbox.scaled(scale), width, height) else {
            continue;
        };
        draw_box(canvas, region);
        boxes.push(region);

        let text = el.index.to_string();
        let label = place_label(&text, region, width, height);
        draw_label(canvas, &text, label);
        labels.push(Label {
            index: el.index,
            text,
            region: label,
        });
    }
    (boxes, labels)
}

/// Smallest region holding every box and label. Full canvas when there is
/// nothing to hold.
pub fn crop_region(width: u32, height: u32, boxes: &[Region], labels: &[Label]) -> Region {
    boxes
        .iter()
        .chain(labels.iter().map(|l| &l.region))
        .copied()
        .reduce(|acc, r| acc.union(&r))
        .filter(|r| !r.is_empty())
        .unwrap_or(Region::full(width, height))
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

fn draw_box(canvas: &mut RgbaImage, region: Region) {
    for t in 0..BOX_STROKE {
        if region.width <= 2 * t || region.height <= 2 * t {
            break;
        }
        let inset = Region {
            x: region.x + t,
            y: region.y + t,
            width: region.width - 2 * t,
            height: region.height - 2 * t,
        };
        draw_hollow_rect_mut(canvas, inset.to_rect(), BOX_COLOR);
    }
}

/// Center the label on the box, then shift it fully onto the canvas.
fn place_label(text: &str, target: Region, width: u32, height: u32) -> Region {
    let label_w = (text.chars().count() as u32 * GLYPH_SIZE * LABEL_SCALE + 2 * LABEL_PAD).min(width);
    let label_h = (GLYPH_SIZE * LABEL_SCALE + 2 * LABEL_PAD).min(height);

    let cx = target.x + target.width / 2;
    let cy = target.y + target.height / 2;
    Region {
        x: cx.saturating_sub(label_w / 2).min(width - label_w),
        y: cy.saturating_sub(label_h / 2).min(height - label_h),
        width: label_w,
        height: label_h,
    }
}

fn draw_label(canvas: &mut RgbaImage, text: &str, at: Region) {
    if at.is_empty() {
        return;
    }
    draw_filled_rect_mut(canvas, at.to_rect(), LABEL_PLATE);

    let cell = GLYPH_SIZE * LABEL_SCALE;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = at.x + LABEL_PAD + i as u32 * cell;
        let origin_y = at.y + LABEL_PAD;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * LABEL_SCALE;
                let py = origin_y + row as u32 * LABEL_SCALE;
                if px >= at.right() || py >= at.bottom() {
                    continue;
                }
                let block = Rect::at(px as i32, py as i32).of_size(LABEL_SCALE, LABEL_SCALE);
                draw_filled_rect_mut(canvas, block, LABEL_COLOR);
            }
        }
    }
}
