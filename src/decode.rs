//! YUV to RGB conversion.
//!
//! The camera delivers I420 or NV12; detection and rendering want RGB. This
//! is a thin conversion layer (BT.601 coefficients), no scaling and no color
//! management. A frame that fails to decode is a per-frame error for the
//! stream loop, never a panic.

use anyhow::Result;
use image::{Rgb, RgbImage};

use crate::frame::{PixelFormat, VideoFrame};

/// Convert a raw camera frame into an RGB buffer ready for inference and
/// display.
pub fn decode_frame(frame: &VideoFrame) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let data = frame.data();

    let luma_len = width as usize * height as usize;
    let chroma_width = (width as usize + 1) / 2;
    let chroma_height = (height as usize + 1) / 2;

    let mut image = RgbImage::new(width, height);
    for row in 0..height as usize {
        for col in 0..width as usize {
            let y = data[row * width as usize + col];
            let chroma_index = (row / 2) * chroma_width + col / 2;
            let (u, v) = match frame.format() {
                PixelFormat::I420 => (
                    data[luma_len + chroma_index],
                    data[luma_len + chroma_width * chroma_height + chroma_index],
                ),
                PixelFormat::Nv12 => (
                    data[luma_len + 2 * chroma_index],
                    data[luma_len + 2 * chroma_index + 1],
                ),
            };
            image.put_pixel(col as u32, row as u32, Rgb(yuv_to_rgb(y, u, v)));
        }
    }
    Ok(image)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelFormat, VideoFrame};

    /// BT.601 forward transform, the inverse of `yuv_to_rgb`.
    fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
        let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
        (y.round() as u8, u.round() as u8, v.round() as u8)
    }

    fn solid_frame(format: PixelFormat, width: u32, height: u32, yuv: (u8, u8, u8)) -> VideoFrame {
        let (y, u, v) = yuv;
        let luma = width as usize * height as usize;
        let chroma = ((width as usize + 1) / 2) * ((height as usize + 1) / 2);

        let mut data = vec![y; luma];
        match format {
            PixelFormat::I420 => {
                data.extend(std::iter::repeat(u).take(chroma));
                data.extend(std::iter::repeat(v).take(chroma));
            }
            PixelFormat::Nv12 => {
                for _ in 0..chroma {
                    data.push(u);
                    data.push(v);
                }
            }
        }
        VideoFrame::new(format, width, height, data).unwrap()
    }

    #[test]
    fn mid_gray_round_trips_exactly() {
        for format in [PixelFormat::I420, PixelFormat::Nv12] {
            let frame = solid_frame(format, 4, 4, (128, 128, 128));
            let image = decode_frame(&frame).unwrap();
            assert_eq!(image.get_pixel(0, 0).0, [128, 128, 128]);
        }
    }

    #[test]
    fn solid_color_round_trips_within_rounding() {
        let expected = [200u8, 60, 100];
        let yuv = rgb_to_yuv(expected[0], expected[1], expected[2]);

        for format in [PixelFormat::I420, PixelFormat::Nv12] {
            let frame = solid_frame(format, 6, 4, yuv);
            let image = decode_frame(&frame).unwrap();
            let got = image.get_pixel(3, 2).0;
            for channel in 0..3 {
                let diff = (got[channel] as i32 - expected[channel] as i32).abs();
                assert!(diff <= 3, "{:?}: channel {} off by {}", format, channel, diff);
            }
        }
    }

    #[test]
    fn decodes_odd_dimensions() {
        let frame = solid_frame(PixelFormat::I420, 5, 3, (90, 110, 150));
        let image = decode_frame(&frame).unwrap();
        assert_eq!(image.width(), 5);
        assert_eq!(image.height(), 3);
        // The last pixel reads the rounded-up chroma plane without panicking.
        let _ = image.get_pixel(4, 2);
    }
}
