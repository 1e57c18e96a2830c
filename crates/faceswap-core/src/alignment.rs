//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical square crop using the five
//! InsightFace reference landmarks and least-squares estimation, and provides
//! the affine helpers paste-back needs to map crops into the original frame.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// 2×3 affine matrix, row-major: `[a, b, tx, c, d, ty]`.
pub type Affine = [f32; 6];

/// Reference landmarks for a square crop of `image_size`.
///
/// Sizes divisible by 112 scale the 112 template; other sizes are treated as
/// multiples of 128, where the template sits 8 px right of a 128-wide canvas.
pub fn reference_landmarks(image_size: usize) -> [(f32, f32); 5] {
    let (ratio, diff_x) = if image_size % 112 == 0 {
        (image_size as f32 / 112.0, 0.0)
    } else {
        let ratio = image_size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * ratio + diff_x, y * ratio))
}

/// Estimate a 2×3 similarity transform (4-DOF: scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
pub fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Affine {
    // Build overdetermined system A * [a, b, tx, ty]^T = B
    // For each point pair (sx, sy) -> (dx, dy):
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16]; // 4x4, row-major
    let mut atb = [0.0f32; 4]; // 4x1

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let x = solve_4x4(&ata, &atb);
    let (a, b, tx, ty) = (x[0], x[1], x[2], x[3]);

    [a, -b, tx, b, a, ty]
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    // Augmented matrix [A | b] as 4x5
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0]; // degenerate landmarks: identity
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x
}

/// Map a point through an affine matrix.
pub fn apply(m: &Affine, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
}

/// Invert a 2×3 affine matrix. `None` when the linear part is singular.
pub fn invert_affine(m: &Affine) -> Option<Affine> {
    let det = m[0] * m[4] - m[1] * m[3];
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let a = m[4] * inv;
    let b = -m[1] * inv;
    let c = -m[3] * inv;
    let d = m[0] * inv;
    Some([a, b, -(a * m[2] + b * m[5]), c, d, -(c * m[2] + d * m[5])])
}

/// Bilinear sample of channel `c` from an interleaved f32 plane; 0 outside.
pub(crate) fn sample_bilinear(
    data: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    c: usize,
    sx: f32,
    sy: f32,
) -> f32 {
    let x0 = sx.floor() as i32;
    let y0 = sy.floor() as i32;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && x < width as i32 && y >= 0 && y < height as i32 {
            data[(y as usize * width + x as usize) * channels + c]
        } else {
            0.0
        }
    };

    sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + sample(x0 + 1, y0) * fx * (1.0 - fy)
        + sample(x0, y0 + 1) * (1.0 - fx) * fy
        + sample(x0 + 1, y0 + 1) * fx * fy
}

/// Apply a 2×3 affine warp (source → output coordinates) to an RGB image.
///
/// Uses bilinear interpolation. Out-of-bounds pixels are filled with 0 (black).
pub fn warp_affine(image: &RgbImage, matrix: &Affine, out_w: u32, out_h: u32) -> RgbImage {
    let mut output = RgbImage::new(out_w, out_h);
    let Some(inv) = invert_affine(matrix) else {
        return output;
    };

    let (src_w, src_h) = (image.width() as usize, image.height() as usize);
    let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();

    for (ox, oy, px) in output.enumerate_pixels_mut() {
        let (sx, sy) = apply(&inv, ox as f32, oy as f32);
        let mut rgb = [0u8; 3];
        for (c, out) in rgb.iter_mut().enumerate() {
            let val = sample_bilinear(&data, src_w, src_h, 3, c, sx, sy);
            *out = val.round().clamp(0.0, 255.0) as u8;
        }
        *px = Rgb(rgb);
    }

    output
}

/// Align a detected face to a canonical `size × size` crop.
///
/// Returns the crop and the frame → crop matrix, which paste-back inverts.
pub fn align_face(
    image: &RgbImage,
    landmarks: &[(f32, f32); 5],
    size: usize,
) -> (RgbImage, Affine) {
    let matrix = estimate_similarity_transform(landmarks, &reference_landmarks(size));
    let crop = warp_affine(image, &matrix, size as u32, size as u32);
    (crop, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → transform should have a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.01, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_reference_landmarks_112_unchanged() {
        assert_eq!(reference_landmarks(112), REFERENCE_LANDMARKS_112);
    }

    #[test]
    fn test_reference_landmarks_128_shifted() {
        let refs = reference_landmarks(128);
        for (r, base) in refs.iter().zip(REFERENCE_LANDMARKS_112.iter()) {
            assert!((r.0 - (base.0 + 8.0)).abs() < 1e-5);
            assert!((r.1 - base.1).abs() < 1e-5);
        }
    }

    #[test]
    fn test_invert_affine_roundtrip() {
        let m: Affine = [0.8, -0.3, 12.0, 0.3, 0.8, -4.0];
        let inv = invert_affine(&m).unwrap();
        let (x, y) = apply(&m, 37.0, 91.0);
        let (bx, by) = apply(&inv, x, y);
        assert!((bx - 37.0).abs() < 1e-3 && (by - 91.0).abs() < 1e-3);
    }

    #[test]
    fn test_invert_affine_singular() {
        assert!(invert_affine(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn test_warp_output_size() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let m = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let out = warp_affine(&frame, &m, 112, 112);
        assert_eq!(out.dimensions(), (112, 112));
        assert_eq!(out.get_pixel(50, 50), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_warp_out_of_bounds_is_black() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        // Shift the source 100 px right: the whole output samples outside.
        let m = [1.0, 0.0, 100.0, 0.0, 1.0, 0.0];
        let out = warp_affine(&frame, &m, 8, 8);
        assert!(out.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_sample_bilinear_midpoint() {
        let data = [0.0f32, 100.0];
        let v = sample_bilinear(&data, 2, 1, 1, 0, 0.5, 0.0);
        assert!((v - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_warp_interpolates_every_channel() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(1, 0, Rgb([100, 40, 10]));
        // Half-pixel shift left: output (0, 0) samples source (0.5, 0).
        let m = [1.0, 0.0, -0.5, 0.0, 1.0, 0.0];
        let out = warp_affine(&frame, &m, 1, 1);
        assert_eq!(out.get_pixel(0, 0), &Rgb([50, 20, 5]));
    }

    #[test]
    fn test_landmark_roundtrip() {
        // Place a bright patch at a landmark position, verify it lands near the
        // reference position after alignment.
        let mut frame = RgbImage::new(200, 200);

        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let (lx, ly) = (src_landmarks[0].0 as u32, src_landmarks[0].1 as u32);
        for dy in 0..5 {
            for dx in 0..5 {
                frame.put_pixel(lx - 2 + dx, ly - 2 + dy, Rgb([255, 0, 0]));
            }
        }

        let (aligned, _) = align_face(&frame, &src_landmarks, 112);
        assert_eq!(aligned.dimensions(), (112, 112));

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;

        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "Expected bright patch near reference left eye ({ref_x}, {ref_y}), max={max_val}");
    }
}
