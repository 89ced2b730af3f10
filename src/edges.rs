// edges.rs — 8-direction rectified-angle crease detector.
//
// For each interior pixel the detector compares its normal against
// neighbors at step distances 1..=edge_range along the four axis and four
// diagonal directions. Each comparison is the dot product, rectified so an
// obtuse angle counts the same as its supplement:
//
//   if cosθ < cos(90°):  cosθ ← cos(180° − acos(cosθ))
//
// which collapses algebraically to negating the value — the measure is
// insensitive to normal-direction flips. The per-direction averages are
// aggregated with Min (any divergent direction marks the pixel) or Mean.
// Flat neighborhoods score ≈ 1, creases drop toward 0. The border strip of
// width edge_range is set to 0.

use crate::config::EdgeAggregation;
use crate::image::Image;
use crate::normal::{Normal, NormalField};

/// Step offsets for the eight directions: right, left, bottom, top and the
/// four diagonals. Order matches the reference accumulators.
const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// Dot product rectified into [0°, 90°]: obtuse angles are reflected, so
/// anti-parallel normals score like parallel ones.
#[inline]
pub fn rectified_dot(a: &Normal, b: &Normal) -> f32 {
    let c = a.dot(b);
    // cos(PI - acos(c)) == -c for c in [-1, 1]
    if c < 0.0 {
        -c
    } else {
        c
    }
}

/// Compute the angle image from a normal field.
///
/// `z_max` is the maximum step distance (`edge_range`); the border of that
/// width is zeroed. Interior pixels get the aggregated rectified-cosine
/// score in approximately [0, 1].
///
/// # Panics
/// Panics if `normals` and `out` dimensions differ.
pub fn angle_image(
    normals: &NormalField,
    z_max: usize,
    aggregation: EdgeAggregation,
    out: &mut Image<f32>,
) {
    assert_eq!(normals.width(), out.width(), "angle_image width mismatch");
    assert_eq!(normals.height(), out.height(), "angle_image height mismatch");

    let w = normals.width();
    let h = normals.height();

    if w <= 2 * z_max || h <= 2 * z_max {
        out.fill(0.0);
        return;
    }

    let inv_z = 1.0 / z_max as f32;
    for y in 0..h {
        for x in 0..w {
            if y < z_max || y >= h - z_max || x < z_max || x >= w - z_max {
                out.set(x, y, 0.0);
                continue;
            }
            // SAFETY: interior pixel; every (x + dx*z, y + dy*z) with
            // z <= z_max stays within the raster.
            let score = unsafe {
                let center = normals.get_unchecked(x, y);
                let mut dir_scores = [0.0f32; 8];
                for (d, &(dx, dy)) in DIRECTIONS.iter().enumerate() {
                    let mut sum = 0.0f32;
                    for z in 1..=z_max as isize {
                        let nx = (x as isize + dx * z) as usize;
                        let ny = (y as isize + dy * z) as usize;
                        sum += rectified_dot(&center, &normals.get_unchecked(nx, ny));
                    }
                    dir_scores[d] = sum * inv_z;
                }
                match aggregation {
                    EdgeAggregation::Min => {
                        dir_scores.iter().copied().fold(f32::INFINITY, f32::min)
                    }
                    EdgeAggregation::Mean => dir_scores.iter().sum::<f32>() / 8.0,
                }
            };
            unsafe { out.set_unchecked(x, y, score) };
        }
    }
}
