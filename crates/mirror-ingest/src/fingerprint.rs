//! Image fingerprinting
//!
//! An image is stretched (no crop, no aspect preservation) to a fixed
//! 128x128 canvas and its pixels are split into three channel sequences in
//! row-major order. Scaling samples the nearest source pixel without blending
//! neighbours. Transparent pixels are composited over black.

use crate::error::Result;
use crate::models::Fingerprint;
use image::imageops::FilterType;
use image::DynamicImage;

pub const RESIZE_WIDTH: u32 = 128;
pub const RESIZE_HEIGHT: u32 = 128;

/// Samples per channel of every fingerprint
pub const FINGERPRINT_LEN: usize = (RESIZE_WIDTH * RESIZE_HEIGHT) as usize;

/// Decode raw image bytes and fingerprint them
///
/// CPU bound; callers on the async runtime should use `spawn_blocking`.
pub fn fingerprint_bytes(bytes: &[u8]) -> Result<Fingerprint> {
    let img = image::load_from_memory(bytes)?;
    Ok(fingerprint_image(&img))
}

pub fn fingerprint_image(img: &DynamicImage) -> Fingerprint {
    let resized = img.resize_exact(RESIZE_WIDTH, RESIZE_HEIGHT, FilterType::Nearest);
    let rgba = resized.to_rgba8();

    let mut fingerprint = Fingerprint::with_capacity(FINGERPRINT_LEN);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        fingerprint.push(over_black(r, a), over_black(g, a), over_black(b, a));
    }
    fingerprint
}

fn over_black(channel: u8, alpha: u8) -> u8 {
    ((u16::from(channel) * u16::from(alpha) + 127) / 255) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_shape_is_fixed_regardless_of_input_size() {
        for (w, h) in [(1, 1), (300, 20), (128, 128), (17, 513)] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])));
            let fp = fingerprint_image(&img);
            assert_eq!(fp.r.len(), FINGERPRINT_LEN);
            assert_eq!(fp.g.len(), FINGERPRINT_LEN);
            assert_eq!(fp.b.len(), FINGERPRINT_LEN);
        }
    }

    #[test]
    fn test_uniform_colour_survives_resize() {
        let bytes = encode_png(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            64,
            32,
            Rgb([200, 100, 50]),
        )));
        let fp = fingerprint_bytes(&bytes).unwrap();
        assert!(fp.r.iter().all(|&v| v == 200));
        assert!(fp.g.iter().all(|&v| v == 100));
        assert!(fp.b.iter().all(|&v| v == 50));
    }

    #[test]
    fn test_downscale_picks_source_pixels_without_blending() {
        // Alternating one-pixel white and black columns
        let img = RgbImage::from_fn(256, 256, |x, _| {
            if x % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let fp = fingerprint_image(&DynamicImage::ImageRgb8(img));

        let mut distinct: Vec<u8> = fp.r.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert!(
            distinct.iter().all(|&v| v == 0 || v == 255),
            "blended values {:?}",
            distinct
        );
    }

    #[test]
    fn test_upscale_repeats_source_pixels() {
        let img = RgbImage::from_fn(2, 2, |x, y| Rgb([(x * 100) as u8, (y * 100) as u8, 7]));
        let fp = fingerprint_image(&DynamicImage::ImageRgb8(img));
        let width = RESIZE_WIDTH as usize;

        assert_eq!(fp.r[0], 0);
        assert_eq!(fp.r[width - 1], 100);
        assert_eq!(fp.g[FINGERPRINT_LEN - 1], 100);
        assert!(fp.r.iter().all(|&v| v == 0 || v == 100));
        assert!(fp.b.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_row_major_order() {
        // Left half red, right half blue; stretched to 128 wide
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let fp = fingerprint_image(&DynamicImage::ImageRgb8(img));
        let width = RESIZE_WIDTH as usize;
        assert!(fp.r[0] > fp.b[0]);
        assert!(fp.b[width - 1] > fp.r[width - 1]);
        assert_eq!(fp.r[0], fp.r[width]);
    }

    #[test]
    fn test_transparency_composites_over_black() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 0]));
        let fp = fingerprint_image(&DynamicImage::ImageRgba8(img));
        assert!(fp.r.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(fingerprint_bytes(b"definitely not an image").is_err());
    }
}
