//! Pixel-level comparison of two screenshots.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffSummary {
    pub actual_size: (u32, u32),
    pub expected_size: (u32, u32),
    pub size_mismatch: bool,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub diff_percent: f64,
    pub bounding_box: Option<BoundingBox>,
}

pub struct DiffOutcome {
    pub summary: DiffSummary,
    /// Expected image dimmed, differing pixels painted red; `None` when identical.
    pub highlight: Option<RgbaImage>,
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Compare over the union of both canvases. A pixel differs when any channel
/// moves by more than `tolerance`; pixels present in only one image always differ.
pub fn compare(actual: &RgbaImage, expected: &RgbaImage, tolerance: u8) -> DiffOutcome {
    let (aw, ah) = actual.dimensions();
    let (ew, eh) = expected.dimensions();
    let width = aw.max(ew);
    let height = ah.max(eh);

    let mut highlight = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for y in 0..height {
        for x in 0..width {
            let a = (x < aw && y < ah).then(|| *actual.get_pixel(x, y));
            let e = (x < ew && y < eh).then(|| *expected.get_pixel(x, y));

            let differs = match (a, e) {
                (Some(a), Some(e)) => channel_delta(&a, &e) > tolerance,
                _ => true,
            };

            if differs {
                diff_pixels += 1;
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
                highlight.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else if let Some(e) = e {
                highlight.put_pixel(x, y, dim(&e));
            }
        }
    }

    let total_pixels = u64::from(width) * u64::from(height);
    let diff_percent = if total_pixels == 0 {
        0.0
    } else {
        diff_pixels as f64 * 100.0 / total_pixels as f64
    };

    DiffOutcome {
        summary: DiffSummary {
            actual_size: (aw, ah),
            expected_size: (ew, eh),
            size_mismatch: (aw, ah) != (ew, eh),
            diff_pixels,
            total_pixels,
            diff_percent,
            bounding_box: bounds.map(|(x0, y0, x1, y1)| BoundingBox {
                x: x0,
                y: y0,
                width: x1 - x0 + 1,
                height: y1 - y0 + 1,
            }),
        },
        highlight: (diff_pixels > 0).then_some(highlight),
    }
}

fn channel_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> u8 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

fn dim(pixel: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, _] = pixel.0;
    let gray = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
    let faded = 255 - (255 - gray) / 3;
    Rgba([faded, faded, faded, 255])
}
