use color_quant::NeuQuant;
use image::DynamicImage;

use super::Processor;
use crate::params::RequestParameters;
use crate::pipeline::PipelineError;

/// Largest palette size the quantizer produces. A cap at or below the
/// current color count is treated as already satisfied and skipped, so the
/// effective cap must sit strictly above it.
const QUANTIZATION_THRESHOLD: usize = 256;

/// One slot above the threshold, reserved for the injected background color
/// which may not already be in the quantized palette.
pub const PALETTE_CAP: usize = QUANTIZATION_THRESHOLD + 1;

/// Reduces the palette to at most [`PALETTE_CAP`] entries including the
/// color given via `background` (or `limit_color`). Transparency is
/// flattened onto that color first. An invalid or absent color directive
/// means the processor does not run.
pub struct LimitColorsProcessor;

impl Processor for LimitColorsProcessor {
    fn process(
        &self,
        image: &mut DynamicImage,
        parameters: &RequestParameters,
    ) -> Result<(), PipelineError> {
        let Some(color) = parameters.hex_color(&["background", "limit_color"]) else {
            return Ok(());
        };
        *image = limit_palette(image, color.rgb());
        Ok(())
    }
}

fn limit_palette(image: &DynamicImage, background: [u8; 3]) -> DynamicImage {
    let mut rgba = image.to_rgba8();

    // Composite partially and fully transparent pixels onto the background
    // color before quantizing.
    for pixel in rgba.pixels_mut() {
        let alpha = pixel[3] as u32;
        if alpha < 255 {
            for channel in 0..3 {
                let fg = pixel[channel] as u32;
                let bg = background[channel] as u32;
                pixel[channel] = ((fg * alpha + bg * (255 - alpha)) / 255) as u8;
            }
            pixel[3] = 255;
        }
    }

    let quantizer = NeuQuant::new(10, QUANTIZATION_THRESHOLD, rgba.as_raw());
    let mut palette: Vec<[u8; 3]> = quantizer
        .color_map_rgb()
        .chunks_exact(3)
        .map(|entry| [entry[0], entry[1], entry[2]])
        .collect();

    // The background color occupies the reserved extra slot; putting it
    // first makes exact matches win over a quantized near-duplicate.
    palette.retain(|entry| *entry != background);
    palette.insert(0, background);
    debug_assert!(palette.len() <= PALETTE_CAP);

    for pixel in rgba.pixels_mut() {
        let mapped = nearest_entry(&palette, [pixel[0], pixel[1], pixel[2]]);
        pixel[0] = mapped[0];
        pixel[1] = mapped[1];
        pixel[2] = mapped[2];
    }

    DynamicImage::ImageRgba8(rgba)
}

fn nearest_entry(palette: &[[u8; 3]], color: [u8; 3]) -> [u8; 3] {
    let mut best = palette[0];
    let mut best_distance = u32::MAX;
    for entry in palette {
        let distance: u32 = entry
            .iter()
            .zip(color.iter())
            .map(|(a, b)| {
                let d = (*a as i32 - *b as i32).unsigned_abs();
                d * d
            })
            .sum();
        if distance < best_distance {
            best_distance = distance;
            best = *entry;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::super::test_support::params;
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::collections::HashSet;

    fn distinct_colors(image: &DynamicImage) -> HashSet<[u8; 4]> {
        image.to_rgba8().pixels().map(|p| p.0).collect()
    }

    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        // Coordinate-derived gradient with far more than 257 distinct colors.
        let mut canvas = RgbaImage::new(width, height);
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            *pixel = Rgba([
                (x * 8 % 256) as u8,
                (y * 8 % 256) as u8,
                ((x * 3 + y * 5) % 256) as u8,
                255,
            ]);
        }
        DynamicImage::ImageRgba8(canvas)
    }

    #[test]
    fn valid_directive_caps_palette_and_keeps_color() {
        let mut canvas = noisy_image(64, 64).to_rgba8();
        // A transparent corner flattens onto the requested color.
        for y in 0..8 {
            for x in 0..8 {
                canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
        let mut image = DynamicImage::ImageRgba8(canvas);
        assert!(distinct_colors(&image).len() > PALETTE_CAP);

        LimitColorsProcessor
            .process(&mut image, &params(&[("background", "1a2b3c")]))
            .unwrap();

        let colors = distinct_colors(&image);
        assert!(colors.len() <= PALETTE_CAP);
        assert!(colors.contains(&[0x1a, 0x2b, 0x3c, 255]));
    }

    #[test]
    fn uppercase_directive_is_canonicalized() {
        let mut image = noisy_image(32, 32);
        LimitColorsProcessor
            .process(&mut image, &params(&[("limit_color", "1A2B3C")]))
            .unwrap();
        assert!(distinct_colors(&image).len() <= PALETTE_CAP);
    }

    #[test]
    fn invalid_or_absent_directive_leaves_image_untouched() {
        let mut image = noisy_image(32, 32);
        let original = image.clone();
        for not_requested in [
            &[] as &[(&str, &str)],
            &[("background", "red")],
            &[("background", "1a2b3")],
            &[("background", "")],
        ] {
            LimitColorsProcessor
                .process(&mut image, &params(not_requested))
                .unwrap();
            assert_eq!(image.as_bytes(), original.as_bytes());
        }
    }

    #[test]
    fn background_wins_over_limit_color() {
        let mut a = noisy_image(16, 16);
        let mut b = a.clone();
        LimitColorsProcessor
            .process(
                &mut a,
                &params(&[("background", "ff0000"), ("limit_color", "00ff00")]),
            )
            .unwrap();
        LimitColorsProcessor
            .process(&mut b, &params(&[("background", "ff0000")]))
            .unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
