// normals.rs — Finite-difference normal estimation and normal smoothing.
//
// The estimator spans two in-plane vectors over a stencil of radius r and
// takes their cross product:
//
//   A = (2r, 0, d(x+r, y-r) - d(x-r, y-r))
//   B = ( r, 2r, d(x,   y+r) - d(x-r, y-r))
//   N = normalize(A × B)
//
// A border strip of width r cannot span the stencil and is marked invalid
// (0,0,0,0). A degenerate stencil (|A × B| = 0, possible only with
// non-finite depth input) is also marked invalid instead of dividing by
// zero.
//
// Two smoothing strategies follow the same border rule — pass the raw
// normal through where the window does not fit:
//   - box average: unweighted mean of the (2r+1)² window, w reset to 1
//   - binomial blur: separable 1-2-1 family kernel, bucketed by range
// Neither re-normalizes the averaged direction to unit length; the edge
// stage consumes dot products of near-unit vectors and tolerates the
// slight shortening inside smoothed regions.

use crate::image::Image;
use crate::kernels::binomial_row;
use crate::normal::{Normal, NormalField};

/// Estimate per-pixel surface normals from a filtered depth image.
///
/// # Panics
/// Panics if `depth` and `out` dimensions differ.
pub fn estimate_normals(depth: &Image<f32>, r: usize, out: &mut NormalField) {
    assert_eq!(depth.width(), out.width(), "estimate_normals width mismatch");
    assert_eq!(depth.height(), out.height(), "estimate_normals height mismatch");

    let w = depth.width();
    let h = depth.height();

    if w <= 2 * r || h <= 2 * r {
        // Stencil never fits: the whole field is border.
        out.as_mut_slice().fill(Normal::INVALID);
        return;
    }

    for y in 0..h {
        for x in 0..w {
            if y < r || y >= h - r || x < r || x >= w - r {
                out.set(x, y, Normal::INVALID);
                continue;
            }
            // SAFETY: interior pixel, all stencil taps are in bounds.
            let n = unsafe {
                let d00 = depth.get_unchecked(x - r, y - r);
                let ax = (2 * r) as f32;
                let az = depth.get_unchecked(x + r, y - r) - d00;
                let bx = r as f32;
                let by = (2 * r) as f32;
                let bz = depth.get_unchecked(x, y + r) - d00;

                // A = (ax, 0, az), B = (bx, by, bz)
                let cx = -az * by;
                let cy = az * bx - ax * bz;
                let cz = ax * by;

                let len = (cx * cx + cy * cy + cz * cz).sqrt();
                if len > 0.0 && len.is_finite() {
                    Normal::new(cx / len, cy / len, cz / len)
                } else {
                    Normal::INVALID
                }
            };
            unsafe { out.set_unchecked(x, y, n) };
        }
    }
}

/// Box-average smoothing: unweighted mean of (x, y, z) over a (2r+1)²
/// window, w reset to 1. Border of width `r` passes the raw normal through.
///
/// With `r == 0` the window is a single pixel and the field passes through.
pub fn box_average(src: &NormalField, r: usize, out: &mut NormalField) {
    assert_eq!(src.width(), out.width(), "box_average width mismatch");
    assert_eq!(src.height(), out.height(), "box_average height mismatch");

    let w = src.width();
    let h = src.height();

    if r == 0 || w <= 2 * r || h <= 2 * r {
        out.copy_from(src);
        return;
    }

    let count = ((2 * r + 1) * (2 * r + 1)) as f32;
    for y in 0..h {
        for x in 0..w {
            if y < r || y >= h - r || x < r || x >= w - r {
                out.set(x, y, src.get(x, y));
                continue;
            }
            let mut ax = 0.0f32;
            let mut ay = 0.0f32;
            let mut az = 0.0f32;
            // SAFETY: interior pixel, window is in bounds.
            unsafe {
                for sy in (y - r)..=(y + r) {
                    for sx in (x - r)..=(x + r) {
                        let n = src.get_unchecked(sx, sy);
                        ax += n.x;
                        ay += n.y;
                        az += n.z;
                    }
                }
                out.set_unchecked(x, y, Normal::new(ax / count, ay / count, az / count));
            }
        }
    }
}

/// Binomial smoothing with a kernel bucketed from `range` (see
/// [`crate::kernels::binomial_row`]). Range ≤ 1 is the identity. The border
/// of kernel half-width passes the raw normal through.
pub fn binomial_smooth(src: &NormalField, range: usize, out: &mut NormalField) {
    assert_eq!(src.width(), out.width(), "binomial_smooth width mismatch");
    assert_eq!(src.height(), out.height(), "binomial_smooth height mismatch");

    let (row, half, norm) = binomial_row(range);
    let w = src.width();
    let h = src.height();

    if half == 0 || w <= 2 * half || h <= 2 * half {
        out.copy_from(src);
        return;
    }

    for y in 0..h {
        for x in 0..w {
            if y < half || y >= h - half || x < half || x >= w - half {
                out.set(x, y, src.get(x, y));
                continue;
            }
            let mut ax = 0.0f32;
            let mut ay = 0.0f32;
            let mut az = 0.0f32;
            // SAFETY: interior pixel, window is in bounds.
            unsafe {
                for (ky, &wy) in row.iter().enumerate() {
                    let sy = y + ky - half;
                    for (kx, &wx) in row.iter().enumerate() {
                        let sx = x + kx - half;
                        let weight = wx * wy; // outer product of the 1-D row
                        let n = src.get_unchecked(sx, sy);
                        ax += n.x * weight;
                        ay += n.y * weight;
                        az += n.z * weight;
                    }
                }
                out.set_unchecked(x, y, Normal::new(ax / norm, ay / norm, az / norm));
            }
        }
    }
}
