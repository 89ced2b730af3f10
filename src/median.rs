// median.rs — Median filter over the raw depth image.
//
// Range sensors produce salt-and-pepper dropouts; a small median window
// removes them without blurring depth discontinuities the way a box filter
// would. The border strip of width (k-1)/2 passes through unchanged —
// never extrapolated past the raster edge.
//
// The reference is the straightforward gather-and-sort: O(k² log k²) per
// pixel. Fine for the small windows this pipeline uses (3–9); a sliding
// histogram would be the optimization if profiles ever demand it.

use crate::image::Image;

/// Apply a k×k median filter, writing into `dst`.
///
/// `k` must be odd (validated at the config layer). For interior pixels the
/// output is the middle element (index k²/2) of the sorted window; the
/// border of width k/2 is copied from `src` verbatim.
///
/// # Panics
/// Panics if `src` and `dst` dimensions differ.
pub fn median_filter(src: &Image<f32>, k: usize, dst: &mut Image<f32>) {
    assert_eq!(src.width(), dst.width(), "median_filter width mismatch");
    assert_eq!(src.height(), dst.height(), "median_filter height mismatch");
    debug_assert!(k % 2 == 1, "median window must be odd (got {k})");

    let w = src.width();
    let h = src.height();
    let half = k / 2;

    // Window smaller than the image in either dimension: everything is
    // border, copy through.
    if w <= 2 * half || h <= 2 * half {
        dst.copy_from(src);
        return;
    }

    dst.copy_from(src); // border strip keeps raw values

    let mut window = vec![0.0f32; k * k];
    for y in half..(h - half) {
        for x in half..(w - half) {
            let mut n = 0;
            // SAFETY: x, y are at least `half` away from every edge.
            unsafe {
                for sy in (y - half)..=(y + half) {
                    for sx in (x - half)..=(x + half) {
                        *window.get_unchecked_mut(n) = src.get_unchecked(sx, sy);
                        n += 1;
                    }
                }
            }
            let mid = n / 2;
            window[..n].sort_unstable_by(f32::total_cmp);
            unsafe {
                dst.set_unchecked(x, y, window[mid]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &Image<f32>, k: usize) -> Image<f32> {
        let mut dst = Image::new(src.width(), src.height());
        median_filter(src, k, &mut dst);
        dst
    }

    #[test]
    fn test_border_passes_through() {
        let mut src = Image::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                src.set(x, y, (x * 10 + y) as f32);
            }
        }
        let out = run(&src, 3);
        // Border strip of width 1 must equal the input exactly.
        for x in 0..6 {
            assert_eq!(out.get(x, 0), src.get(x, 0));
            assert_eq!(out.get(x, 5), src.get(x, 5));
        }
        for y in 0..6 {
            assert_eq!(out.get(0, y), src.get(0, y));
            assert_eq!(out.get(5, y), src.get(5, y));
        }
    }

    #[test]
    fn test_removes_single_outlier() {
        // Constant plane with one spike: the median wipes the spike at the
        // interior pixel but the spike still influences nothing else.
        let mut src = Image::from_vec(5, 5, vec![7.0; 25]);
        src.set(2, 2, 1000.0);
        let out = run(&src, 3);
        assert_eq!(out.get(2, 2), 7.0);
        assert_eq!(out.get(1, 1), 7.0);
    }

    #[test]
    fn test_window_size_one_is_identity() {
        let src = Image::from_vec(4, 4, (0..16).map(|i| i as f32).collect());
        let out = run(&src, 1);
        assert_eq!(out.as_slice(), src.as_slice());
    }

    #[test]
    fn test_median_of_known_window() {
        // 3×3 window values 1..9 → median 5 at the center.
        let src = Image::from_vec(3, 3, (1..=9).map(|i| i as f32).collect());
        let out = run(&src, 3);
        assert_eq!(out.get(1, 1), 5.0);
    }

    #[test]
    fn test_window_larger_than_image_copies() {
        let src = Image::from_vec(3, 3, (0..9).map(|i| i as f32).collect());
        let out = run(&src, 7);
        assert_eq!(out.as_slice(), src.as_slice());
    }

    #[test]
    fn test_deterministic() {
        let src = Image::from_vec(8, 8, (0..64).map(|i| ((i * 37) % 11) as f32).collect());
        let a = run(&src, 5);
        let b = run(&src, 5);
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
