//! Deterministic image preprocessing pipeline.
//!
//! Four stages in fixed order, each feeding the next:
//! enhance (luma histogram equalization) → restore (non-local-means
//! denoising) → segment (global binary threshold) → morphology (5×5
//! opening). The stage order is load-bearing: segmenting before restoring
//! binarizes sensor noise and produces different, incorrect embeddings
//! downstream.

use image::{GrayImage, RgbImage};

/// Global binary threshold: strictly greater ⇒ foreground (255).
const SEGMENT_THRESHOLD: u8 = 127;
/// Structuring element half-width — a radius of 2 gives the 5×5 kernel.
const MORPH_KERNEL_RADIUS: i32 = 2;
/// Non-local-means patch half-width (3×3 patches).
const NLM_PATCH_RADIUS: i32 = 1;
/// Non-local-means search window half-width (11×11 window).
const NLM_SEARCH_RADIUS: i32 = 5;
/// Non-local-means filter strength (h).
const NLM_FILTER_STRENGTH: f32 = 10.0;

/// Run the full preprocessing chain on a decoded color photo.
///
/// Total over any raster input of a few pixels per side or more; never
/// fails. Output is strictly two-valued (0/255).
pub fn preprocess(image: &RgbImage) -> GrayImage {
    let enhanced = enhance(image);
    let restored = restore(&enhanced);
    let segmented = segment(&restored);
    morphology_open(&segmented)
}

/// Stage 1: normalize illumination by equalizing the luma channel.
///
/// Converts to YCbCr (BT.601), histogram-equalizes Y only, converts back.
/// Chroma is untouched, so color balance survives the contrast stretch.
pub fn enhance(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let total = (width as u64) * (height as u64);

    // Decompose into luma + chroma planes.
    let mut luma = vec![0u8; total as usize];
    let mut chroma = vec![(0.0f32, 0.0f32); total as usize];
    for (i, pixel) in image.pixels().enumerate() {
        let [r, g, b] = pixel.0;
        let (y, cb, cr) = rgb_to_ycbcr(r, g, b);
        luma[i] = y.round().clamp(0.0, 255.0) as u8;
        chroma[i] = (cb, cr);
    }

    let map = equalization_map(&luma);

    let mut out = RgbImage::new(width, height);
    for (i, pixel) in out.pixels_mut().enumerate() {
        let y = map[luma[i] as usize] as f32;
        let (cb, cr) = chroma[i];
        pixel.0 = ycbcr_to_rgb(y, cb, cr);
    }
    out
}

/// Build the histogram-equalization lookup table for a luma plane.
///
/// Flat planes (all pixels at one level) map to themselves — the
/// equalization denominator would be zero.
fn equalization_map(luma: &[u8]) -> [u8; 256] {
    let mut histogram = [0u64; 256];
    for &y in luma {
        histogram[y as usize] += 1;
    }

    let total = luma.len() as u64;
    let cdf_min = histogram
        .iter()
        .copied()
        .find(|&count| count > 0)
        .unwrap_or(0);

    let mut map = [0u8; 256];
    if total == cdf_min {
        for (level, entry) in map.iter_mut().enumerate() {
            *entry = level as u8;
        }
        return map;
    }

    let mut cdf = 0u64;
    for level in 0..256 {
        cdf += histogram[level];
        if histogram[level] == 0 {
            continue;
        }
        let scaled = ((cdf - cdf_min) as f64 / (total - cdf_min) as f64) * 255.0;
        map[level] = scaled.round().clamp(0.0, 255.0) as u8;
    }
    map
}

fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (y, cb, cr)
}

fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    let r = y + 1.402 * (cr - 128.0);
    let g = y - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0);
    let b = y + 1.772 * (cb - 128.0);
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Stage 2: suppress sensor/compression noise with non-local means.
///
/// Each output pixel is a weighted average over an 11×11 search window;
/// weights fall off exponentially with 3×3 patch dissimilarity. Applied
/// per channel, output clamped back to 8-bit.
pub fn restore(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i32, height as i32);
    let h2 = NLM_FILTER_STRENGTH * NLM_FILTER_STRENGTH;

    // Clamped sampler (replicate borders).
    let sample = |x: i32, y: i32, c: usize| -> f32 {
        let cx = x.clamp(0, w - 1) as u32;
        let cy = y.clamp(0, h - 1) as u32;
        image.get_pixel(cx, cy).0[c] as f32
    };

    // Mean squared difference between the 3×3 patches centered at two points.
    let patch_distance = |ax: i32, ay: i32, bx: i32, by: i32, c: usize| -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0.0f32;
        for dy in -NLM_PATCH_RADIUS..=NLM_PATCH_RADIUS {
            for dx in -NLM_PATCH_RADIUS..=NLM_PATCH_RADIUS {
                let diff = sample(ax + dx, ay + dy, c) - sample(bx + dx, by + dy, c);
                sum += diff * diff;
                count += 1.0;
            }
        }
        sum / count
    };

    let mut out = RgbImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut channels = [0u8; 3];
            for (c, channel) in channels.iter_mut().enumerate() {
                let mut weight_sum = 0.0f32;
                let mut value_sum = 0.0f32;
                for dy in -NLM_SEARCH_RADIUS..=NLM_SEARCH_RADIUS {
                    for dx in -NLM_SEARCH_RADIUS..=NLM_SEARCH_RADIUS {
                        let (nx, ny) = (x + dx, y + dy);
                        let d2 = patch_distance(x, y, nx, ny, c);
                        let weight = (-d2 / h2).exp();
                        weight_sum += weight;
                        value_sum += weight * sample(nx, ny, c);
                    }
                }
                *channel = (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x as u32, y as u32, image::Rgb(channels));
        }
    }
    out
}

/// Stage 3: isolate foreground structure by intensity.
///
/// BT.601 grayscale followed by a fixed global threshold at 127: strictly
/// greater ⇒ 255, else 0. Output pixel set is exactly {0, 255}.
pub fn segment(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(width, height);
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let [r, g, b] = src.0;
        let (luma, _, _) = rgb_to_ycbcr(r, g, b);
        let gray = luma.round().clamp(0.0, 255.0) as u8;
        dst.0 = [if gray > SEGMENT_THRESHOLD { 255 } else { 0 }];
    }
    out
}

/// Stage 4: remove small specks introduced by thresholding.
///
/// Morphological opening (erosion then dilation) with a 5×5 all-ones
/// structuring element, replicate border handling.
pub fn morphology_open(image: &GrayImage) -> GrayImage {
    let eroded = morph(image, MorphOp::Erode);
    morph(&eroded, MorphOp::Dilate)
}

#[derive(Clone, Copy)]
enum MorphOp {
    Erode,
    Dilate,
}

fn morph(image: &GrayImage, op: MorphOp) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i32, height as i32);

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut acc = match op {
                MorphOp::Erode => u8::MAX,
                MorphOp::Dilate => u8::MIN,
            };
            for dy in -MORPH_KERNEL_RADIUS..=MORPH_KERNEL_RADIUS {
                for dx in -MORPH_KERNEL_RADIUS..=MORPH_KERNEL_RADIUS {
                    let cx = (x + dx).clamp(0, w - 1) as u32;
                    let cy = (y + dy).clamp(0, h - 1) as u32;
                    let v = image.get_pixel(cx, cy).0[0];
                    acc = match op {
                        MorphOp::Erode => acc.min(v),
                        MorphOp::Dilate => acc.max(v),
                    };
                }
            }
            out.put_pixel(x as u32, y as u32, image::Luma([acc]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Horizontal gradient with enough distinct levels to exercise
    /// equalization and denoising.
    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = ((x * 255) / width.max(1)) as u8;
            Rgb([v, v, v])
        })
    }

    fn flat_image(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    fn distinct_values(img: &GrayImage) -> Vec<u8> {
        let mut values: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        values.sort_unstable();
        values.dedup();
        values
    }

    #[test]
    fn preprocess_output_is_binary() {
        let out = preprocess(&gradient_image(32, 32));
        for v in distinct_values(&out) {
            assert!(v == 0 || v == 255, "unexpected gray level {v}");
        }
    }

    #[test]
    fn preprocess_preserves_dimensions() {
        let out = preprocess(&gradient_image(21, 13));
        assert_eq!(out.dimensions(), (21, 13));
    }

    #[test]
    fn preprocess_is_deterministic() {
        let img = gradient_image(24, 24);
        assert_eq!(preprocess(&img), preprocess(&img));
    }

    #[test]
    fn intermediate_stages_are_not_binary() {
        // Binarization must happen at the segment stage, not before: after
        // enhance + restore a gradient still has many distinct gray levels.
        let restored = restore(&enhance(&gradient_image(32, 8)));
        let mut grays: Vec<u8> = restored.pixels().map(|p| p.0[0]).collect();
        grays.sort_unstable();
        grays.dedup();
        assert!(
            grays.len() > 2,
            "expected continuous tones before segmentation, got {} levels",
            grays.len()
        );

        let segmented = segment(&restored);
        for v in distinct_values(&segmented) {
            assert!(v == 0 || v == 255);
        }
    }

    #[test]
    fn enhance_stretches_contrast() {
        // Mid-gray gradient spanning [100, 160) should stretch toward [0, 255].
        let img = RgbImage::from_fn(60, 4, |x, _| {
            let v = (100 + x) as u8;
            Rgb([v, v, v])
        });
        let enhanced = enhance(&img);
        let lumas: Vec<u8> = enhanced.pixels().map(|p| p.0[0]).collect();
        let min = *lumas.iter().min().unwrap();
        let max = *lumas.iter().max().unwrap();
        assert!(min < 10, "equalized min should approach 0, got {min}");
        assert!(max > 245, "equalized max should approach 255, got {max}");
    }

    #[test]
    fn enhance_flat_image_unchanged() {
        let img = flat_image(16, 16, 90);
        let enhanced = enhance(&img);
        for pixel in enhanced.pixels() {
            assert_eq!(pixel.0, [90, 90, 90]);
        }
    }

    #[test]
    fn restore_flat_image_unchanged() {
        let restored = restore(&flat_image(16, 16, 120));
        for pixel in restored.pixels() {
            assert_eq!(pixel.0, [120, 120, 120]);
        }
    }

    #[test]
    fn restore_dampens_isolated_spike() {
        // A lone +20 outlier on a flat background gets averaged toward it.
        let mut img = flat_image(15, 15, 100);
        img.put_pixel(7, 7, Rgb([120, 120, 120]));
        let restored = restore(&img);
        let center = restored.get_pixel(7, 7).0[0];
        assert!(center < 120, "spike not dampened: {center}");
        assert!(center >= 100, "spike overcorrected: {center}");
    }

    #[test]
    fn segment_threshold_is_strict() {
        let mut img = flat_image(2, 1, 127);
        img.put_pixel(1, 0, Rgb([128, 128, 128]));
        let out = segment(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 0, "127 must stay background");
        assert_eq!(out.get_pixel(1, 0).0[0], 255, "128 must be foreground");
    }

    #[test]
    fn opening_removes_small_speck() {
        // A 2×2 speck cannot survive erosion by a 5×5 kernel.
        let mut img = GrayImage::new(20, 20);
        for y in 9..11 {
            for x in 9..11 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        let opened = morphology_open(&img);
        assert!(opened.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn opening_preserves_large_region() {
        // A 12×12 block keeps its interior through a 5×5 opening.
        let mut img = GrayImage::new(24, 24);
        for y in 6..18 {
            for x in 6..18 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        let opened = morphology_open(&img);
        assert_eq!(opened.get_pixel(12, 12).0[0], 255);
        assert_eq!(opened.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn preprocess_handles_tiny_images() {
        // Total over any valid raster input, kernels larger than the image included.
        let out = preprocess(&gradient_image(3, 3));
        assert_eq!(out.dimensions(), (3, 3));
    }
}
