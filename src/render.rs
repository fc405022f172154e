//! Bounding-box overlay for the annotated stream.
//!
//! Draws detection boxes and `label conf%` tags straight onto the decoded
//! RGB frame before it reaches the display sink. Box geometry arrives
//! normalized from the detector and is denormalized (and optionally
//! expanded) here.

use std::collections::HashMap;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::Detection;

/// MegaDetector v5's "typical detection threshold": boxes below this are
/// reported by the model but not worth showing.
pub const DEFAULT_RENDERING_CONFIDENCE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_BOX_THICKNESS: u32 = 4;
pub const DEFAULT_BOX_EXPANSION: i32 = 0;

/// Rendering knobs, passed in at construction instead of read from globals.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Detector category id to human-readable label.
    pub label_map: HashMap<String, String>,
    /// Minimum confidence for a box to be drawn.
    pub confidence_threshold: f32,
    /// Box outline thickness in pixels.
    pub thickness: u32,
    /// Pixels to grow each box side by before drawing.
    pub expansion: i32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            label_map: default_label_map(),
            confidence_threshold: DEFAULT_RENDERING_CONFIDENCE_THRESHOLD,
            thickness: DEFAULT_BOX_THICKNESS,
            expansion: DEFAULT_BOX_EXPANSION,
        }
    }
}

/// MegaDetector's category ids.
pub fn default_label_map() -> HashMap<String, String> {
    [("1", "animal"), ("2", "person"), ("3", "vehicle")]
        .into_iter()
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .collect()
}

/// Draw every above-threshold detection onto the frame.
pub fn render_detections(image: &mut RgbImage, detections: &[Detection], config: &RenderConfig) {
    for detection in detections {
        if detection.conf < config.confidence_threshold {
            continue;
        }
        let Some(rect) = pixel_rect(detection, image.width(), image.height(), config.expansion)
        else {
            continue;
        };

        let color = category_color(&detection.category);
        draw_box(image, rect, config.thickness, color);

        let label = config
            .label_map
            .get(&detection.category)
            .map(String::as_str)
            .unwrap_or(detection.category.as_str());
        let tag = format!("{} {:.0}%", label, detection.conf * 100.0);
        draw_tag(image, &tag, rect, color);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PixelRect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

/// Denormalize a detection box, apply expansion, and clip it to the image.
/// Returns `None` when nothing visible remains.
fn pixel_rect(detection: &Detection, width: u32, height: u32, expansion: i32) -> Option<PixelRect> {
    let [bx, by, bw, bh] = detection.bbox;
    let mut x = (bx * width as f32).round() as i64 - expansion as i64;
    let mut y = (by * height as f32).round() as i64 - expansion as i64;
    let mut w = (bw * width as f32).round() as i64 + 2 * expansion as i64;
    let mut h = (bh * height as f32).round() as i64 + 2 * expansion as i64;

    if x < 0 {
        w += x;
        x = 0;
    }
    if y < 0 {
        h += y;
        y = 0;
    }
    w = w.min(width as i64 - x);
    h = h.min(height as i64 - y);
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(PixelRect {
        x,
        y,
        width: w,
        height: h,
    })
}

fn draw_box(image: &mut RgbImage, rect: PixelRect, thickness: u32, color: Rgb<u8>) {
    for inset in 0..thickness as i64 {
        let w = rect.width - 2 * inset;
        let h = rect.height - 2 * inset;
        if w < 1 || h < 1 {
            break;
        }
        let outline = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, outline, color);
    }
}

// ----------------------------------------------------------------------------
// Label tags
// ----------------------------------------------------------------------------

const GLYPH_WIDTH: i64 = 6;
const TAG_HEIGHT: i64 = 11;

/// Stamp a filled tag with the label text above the box (or inside its top
/// edge when the box touches the top of the frame).
fn draw_tag(image: &mut RgbImage, text: &str, rect: PixelRect, color: Rgb<u8>) {
    let tag_width = text.chars().count() as i64 * GLYPH_WIDTH + 3;
    let x = rect.x;
    let y = if rect.y >= TAG_HEIGHT {
        rect.y - TAG_HEIGHT
    } else {
        rect.y
    };

    for dy in 0..TAG_HEIGHT {
        for dx in 0..tag_width {
            put_pixel_clipped(image, x + dx, y + dy, color);
        }
    }

    let ink = Rgb([255u8, 255, 255]);
    for (i, ch) in text.chars().enumerate() {
        let glyph = glyph(ch.to_ascii_uppercase());
        let gx = x + 2 + i as i64 * GLYPH_WIDTH;
        let gy = y + 2;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..5 {
                if (bits >> (4 - col)) & 1 == 1 {
                    put_pixel_clipped(image, gx + col, gy + row as i64, ink);
                }
            }
        }
    }
}

fn put_pixel_clipped(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn category_color(category: &str) -> Rgb<u8> {
    match category {
        "1" => Rgb([255, 82, 82]),  // animal
        "2" => Rgb([64, 156, 255]), // person
        "3" => Rgb([255, 195, 64]), // vehicle
        _ => Rgb([200, 200, 200]),
    }
}

/// 5x7 bitmap glyphs, one row per byte, low five bits used.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0E],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x0A, 0x04, 0x04, 0x04, 0x0A, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '%' => [0x19, 0x1A, 0x02, 0x04, 0x08, 0x0B, 0x13],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(conf: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            category: "1".to_string(),
            conf,
            bbox,
        }
    }

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([0, 0, 0]))
    }

    #[test]
    fn sub_threshold_detections_draw_nothing() {
        let mut image = blank(64, 64);
        let before = image.clone();
        render_detections(
            &mut image,
            &[detection(0.1, [0.2, 0.2, 0.5, 0.5])],
            &RenderConfig::default(),
        );
        assert_eq!(image, before);
    }

    #[test]
    fn above_threshold_detection_paints_the_outline() {
        let mut image = blank(100, 100);
        render_detections(
            &mut image,
            &[detection(0.9, [0.2, 0.3, 0.4, 0.4])],
            &RenderConfig {
                thickness: 1,
                ..RenderConfig::default()
            },
        );
        // Top-left corner of the box sits at (20, 30) in animal red.
        assert_eq!(image.get_pixel(20, 30).0, [255, 82, 82]);
        // Box interior stays untouched.
        assert_eq!(image.get_pixel(40, 50).0, [0, 0, 0]);
    }

    #[test]
    fn edge_touching_and_expanded_boxes_stay_in_bounds() {
        let mut image = blank(32, 32);
        render_detections(
            &mut image,
            &[
                detection(0.9, [0.0, 0.0, 1.0, 1.0]),
                detection(0.9, [0.9, 0.9, 0.3, 0.3]),
            ],
            &RenderConfig {
                expansion: 5,
                ..RenderConfig::default()
            },
        );
        // Reaching here without a panic is the assertion; spot-check a corner.
        assert_eq!(image.get_pixel(0, 0).0, [255, 82, 82]);
    }

    #[test]
    fn fully_out_of_frame_box_is_skipped() {
        assert!(pixel_rect(&detection(0.9, [1.0, 1.0, 0.2, 0.2]), 64, 64, 0).is_none());
    }

    #[test]
    fn label_map_defaults_cover_megadetector_categories() {
        let map = default_label_map();
        assert_eq!(map.get("1").unwrap(), "animal");
        assert_eq!(map.get("2").unwrap(), "person");
        assert_eq!(map.get("3").unwrap(), "vehicle");
    }
}
