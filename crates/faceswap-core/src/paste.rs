//! Paste-back: blend a generated face crop into the original frame.
//!
//! The crop is warped back through the inverse alignment transform. A soft
//! mask is built from the warped crop footprint (threshold, box erosion,
//! Gaussian feathering) and used as a per-pixel alpha.

use crate::alignment::{self, Affine};
use image::{Rgb, RgbImage};

/// Warped-footprint values above this become fully opaque.
const MASK_THRESHOLD: f32 = 20.0;

/// Integer rectangle `[x0, x1) × [y0, y1)` in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Region {
    fn width(&self) -> usize {
        self.x1 - self.x0
    }

    fn height(&self) -> usize {
        self.y1 - self.y0
    }
}

/// Blend `fake` (interleaved RGB, `size × size`, values in [0, 255]) into a
/// copy of `target`. `matrix` maps frame coordinates to crop coordinates.
pub fn paste_back(target: &RgbImage, fake: &[f32], size: usize, matrix: &Affine) -> RgbImage {
    let mut result = target.clone();
    let Some(region) = footprint(target, size, matrix) else {
        return result;
    };
    let (w, h) = (region.width(), region.height());

    let white = vec![255.0f32; size * size];
    let mut warped = vec![0.0f32; w * h * 3];
    let mut mask = vec![0.0f32; w * h];

    for ry in 0..h {
        for rx in 0..w {
            let (sx, sy) = alignment::apply(
                matrix,
                (region.x0 + rx) as f32,
                (region.y0 + ry) as f32,
            );
            let i = ry * w + rx;
            for c in 0..3 {
                warped[i * 3 + c] = alignment::sample_bilinear(fake, size, size, 3, c, sx, sy);
            }
            let m = alignment::sample_bilinear(&white, size, size, 1, 0, sx, sy);
            mask[i] = if m > MASK_THRESHOLD { 255.0 } else { m };
        }
    }

    let Some(extent) = opaque_extent(&mask, w, h) else {
        return result;
    };

    let erode_k = (extent / 10).max(10);
    erode_box(&mut mask, w, h, erode_k);
    let blur_k = 2 * (extent / 20).max(5) + 1;
    gaussian_blur(&mut mask, w, h, blur_k);

    tracing::debug!(
        x = region.x0,
        y = region.y0,
        width = w,
        height = h,
        extent,
        erode_k,
        blur_k,
        "pasting face crop"
    );

    for ry in 0..h {
        for rx in 0..w {
            let i = ry * w + rx;
            let alpha = mask[i] / 255.0;
            if alpha <= 0.0 {
                continue;
            }
            let (x, y) = ((region.x0 + rx) as u32, (region.y0 + ry) as u32);
            let base = *result.get_pixel(x, y);
            let mut out = [0u8; 3];
            for (c, o) in out.iter_mut().enumerate() {
                *o = blend(warped[i * 3 + c], base[c], alpha);
            }
            result.put_pixel(x, y, Rgb(out));
        }
    }

    result
}

/// `alpha · fake + (1 - alpha) · base`, rounded to the nearest u8.
fn blend(fake: f32, base: u8, alpha: f32) -> u8 {
    let v = alpha * fake + (1.0 - alpha) * base as f32;
    v.round().clamp(0.0, 255.0) as u8
}

/// Frame-space bounding rectangle of the crop, clamped to the image.
fn footprint(target: &RgbImage, size: usize, matrix: &Affine) -> Option<Region> {
    let inv = alignment::invert_affine(matrix)?;
    let s = size as f32;
    let corners = [(0.0, 0.0), (s, 0.0), (0.0, s), (s, s)].map(|(x, y)| alignment::apply(&inv, x, y));

    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).floor() - 1.0;
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).floor() - 1.0;
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil() + 1.0;
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil() + 1.0;

    let clamp = |v: f32, hi: u32| v.clamp(0.0, hi as f32) as usize;
    let region = Region {
        x0: clamp(min_x, target.width()),
        y0: clamp(min_y, target.height()),
        x1: clamp(max_x, target.width()),
        y1: clamp(max_y, target.height()),
    };

    (region.width() > 0 && region.height() > 0).then_some(region)
}

/// Side of the square with the same area as the opaque mask's bounding extent.
fn opaque_extent(mask: &[f32], w: usize, h: usize) -> Option<usize> {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
    let mut any = false;
    for y in 0..h {
        for x in 0..w {
            if mask[y * w + x] >= 255.0 {
                any = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }
    any.then(|| (((max_y - min_y) * (max_x - min_x)) as f64).sqrt() as usize)
}

/// Morphological erosion with a `k × k` box (anchor at `k / 2`).
///
/// Samples outside the plane are ignored, so borders do not erode.
fn erode_box(mask: &mut [f32], w: usize, h: usize, k: usize) {
    if k <= 1 {
        return;
    }
    let before = k / 2;
    let after = k - 1 - before;

    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let lo = x.saturating_sub(before);
            let hi = (x + after).min(w - 1);
            tmp[y * w + x] = mask[y * w + lo..=y * w + hi]
                .iter()
                .copied()
                .fold(f32::INFINITY, f32::min);
        }
    }
    for x in 0..w {
        for y in 0..h {
            let lo = y.saturating_sub(before);
            let hi = (y + after).min(h - 1);
            mask[y * w + x] = (lo..=hi)
                .map(|yy| tmp[yy * w + x])
                .fold(f32::INFINITY, f32::min);
        }
    }
}

/// Normalized 1-D Gaussian kernel; sigma derived from size as OpenCV does
/// when sigma is 0.
fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    let sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (ksize / 2) as f32;
    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Separable Gaussian blur with replicated borders.
fn gaussian_blur(mask: &mut [f32], w: usize, h: usize, ksize: usize) {
    let kernel = gaussian_kernel(ksize);
    let radius = (ksize / 2) as i64;

    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, kv) in kernel.iter().enumerate() {
                let xx = (x as i64 + i as i64 - radius).clamp(0, w as i64 - 1) as usize;
                acc += kv * mask[y * w + xx];
            }
            tmp[y * w + x] = acc;
        }
    }
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, kv) in kernel.iter().enumerate() {
                let yy = (y as i64 + i as i64 - radius).clamp(0, h as i64 - 1) as usize;
                acc += kv * tmp[yy * w + x];
            }
            mask[y * w + x] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        let k = gaussian_kernel(11);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[10]).abs() < 1e-7);
        assert!(k[5] > k[4]);
    }

    #[test]
    fn test_blend_rounds_fractional_alpha() {
        assert_eq!(blend(201.0, 0, 0.5), 101);
        assert_eq!(blend(200.0, 1, 0.25), 51);
        assert_eq!(blend(255.0, 0, 0.9999), 255);
        assert_eq!(blend(10.0, 90, 0.0), 90);
    }

    #[test]
    fn test_erode_box_shrinks_square() {
        let (w, h) = (20usize, 20usize);
        let mut mask = vec![0.0f32; w * h];
        for y in 5..15 {
            for x in 5..15 {
                mask[y * w + x] = 255.0;
            }
        }
        erode_box(&mut mask, w, h, 3);
        assert_eq!(mask[5 * w + 5], 0.0);
        assert_eq!(mask[6 * w + 6], 255.0);
        assert_eq!(mask[13 * w + 13], 255.0);
        assert_eq!(mask[14 * w + 14], 0.0);
    }

    #[test]
    fn test_erode_box_ignores_plane_border() {
        let mut mask = vec![255.0f32; 16];
        erode_box(&mut mask, 4, 4, 3);
        assert!(mask.iter().all(|&v| v == 255.0));
    }

    #[test]
    fn test_gaussian_blur_preserves_constant() {
        let mut mask = vec![100.0f32; 9 * 7];
        gaussian_blur(&mut mask, 9, 7, 5);
        assert!(mask.iter().all(|&v| (v - 100.0).abs() < 1e-3));
    }

    #[test]
    fn test_opaque_extent() {
        let (w, h) = (10usize, 10usize);
        let mut mask = vec![0.0f32; w * h];
        mask[2 * w + 1] = 255.0;
        mask[6 * w + 5] = 255.0;
        // (6-2) * (5-1) = 16 -> side 4
        assert_eq!(opaque_extent(&mask, w, h), Some(4));
        assert_eq!(opaque_extent(&vec![10.0; w * h], w, h), None);
    }

    #[test]
    fn test_paste_back_replaces_center_and_keeps_outside() {
        let target = RgbImage::from_pixel(300, 300, Rgb([0, 0, 0]));
        let size = 128usize;
        let fake = vec![200.0f32; size * size * 3];
        // Crop occupies frame pixels [100, 228).
        let matrix: Affine = [1.0, 0.0, -100.0, 0.0, 1.0, -100.0];

        let out = paste_back(&target, &fake, size, &matrix);

        assert_eq!(out.get_pixel(164, 164), &Rgb([200, 200, 200]));
        assert_eq!(out.get_pixel(10, 10), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(290, 164), &Rgb([0, 0, 0]));
        // Feathered edge sits between the two.
        let edge = out.get_pixel(106, 164)[0];
        assert!(edge < 200, "edge {edge} should be feathered");
    }

    #[test]
    fn test_paste_back_outside_frame_is_noop() {
        let target = RgbImage::from_pixel(50, 50, Rgb([7, 8, 9]));
        let fake = vec![255.0f32; 128 * 128 * 3];
        let matrix: Affine = [1.0, 0.0, 1000.0, 0.0, 1.0, 1000.0];
        let out = paste_back(&target, &fake, 128, &matrix);
        assert_eq!(out, target);
    }

    #[test]
    fn test_paste_back_singular_matrix_is_noop() {
        let target = RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]));
        let fake = vec![255.0f32; 4 * 4 * 3];
        let out = paste_back(&target, &fake, 4, &[0.0; 6]);
        assert_eq!(out, target);
    }
}
