//! Face alignment via 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference layout
//! and warps the face into the 112×112 crop ArcFace expects.

use crate::types::Frame;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Least-squares similarity (scale, rotation, translation) from `src` to `dst`.
///
/// Returns a row-major 3×3 matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// | 0   0   1 |
/// ```
fn similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 9] {
    let n = src.len() as f32;
    let centroid = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (sxm, sym) = centroid(src);
    let (dxm, dym) = centroid(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut norm = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - sxm, sy - sym);
        let (dx, dy) = (dx - dxm, dy - dym);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        norm += sx * sx + sy * sy;
    }

    if norm < 1e-12 {
        // Degenerate landmarks: translate only.
        return [1.0, 0.0, dxm - sxm, 0.0, 1.0, dym - sym, 0.0, 0.0, 1.0];
    }

    let a = dot / norm;
    let b = cross / norm;
    let tx = dxm - (a * sxm - b * sym);
    let ty = dym - (b * sxm + a * sym);

    [a, -b, tx, b, a, ty, 0.0, 0.0, 1.0]
}

/// Align a detected face to a canonical 112×112 grayscale crop.
///
/// Returns `None` when the frame buffer is malformed or the landmarks
/// collapse to a non-invertible transform.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> Option<GrayImage> {
    let image = frame.to_luma()?;
    let matrix = similarity_transform(landmarks, &REFERENCE_LANDMARKS);
    let projection = Projection::from_matrix(matrix)?;

    let mut aligned = GrayImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    warp_into(&image, &projection, Interpolation::Bilinear, Luma([0]), &mut aligned);
    Some(aligned)
}
