// binarize.rs — Threshold the angle image into the crease mask.
//
// Pure elementwise threshold: 255 where the score exceeds the threshold
// (flat surface), 0 elsewhere (crease or border). Monotone in the
// threshold — raising it can only flip pixels 255 → 0.

use crate::image::Image;

/// Binarize `angle` into `out` at threshold `t`.
///
/// # Panics
/// Panics if dimensions differ.
pub fn binarize(angle: &Image<f32>, t: f32, out: &mut Image<u8>) {
    assert_eq!(angle.width(), out.width(), "binarize width mismatch");
    assert_eq!(angle.height(), out.height(), "binarize height mismatch");

    let src = angle.as_slice();
    let dst = out.as_mut_slice();
    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d = if s > t { 255 } else { 0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let angle = Image::from_vec(3, 1, vec![0.5, 0.89, 0.9]);
        let mut mask = Image::new(3, 1);
        binarize(&angle, 0.89, &mut mask);
        assert_eq!(mask.as_slice(), &[0, 0, 255]);
    }

    #[test]
    fn test_monotone_in_threshold() {
        let angle = Image::from_vec(4, 2, vec![0.1, 0.3, 0.5, 0.7, 0.9, 0.95, 0.99, 1.0]);
        let mut prev = Image::new(4, 2);
        binarize(&angle, 0.0, &mut prev);
        for t in [0.2, 0.4, 0.6, 0.8, 0.92, 0.97, 1.1] {
            let mut cur = Image::new(4, 2);
            binarize(&angle, t, &mut cur);
            for (p, c) in prev.as_slice().iter().zip(cur.as_slice()) {
                // Raising the threshold can only clear pixels, never set them.
                assert!(c <= p, "pixel flipped 0 -> 255 when threshold rose");
            }
            prev = cur;
        }
    }

    #[test]
    fn test_all_or_nothing() {
        let angle = Image::from_vec(2, 2, vec![0.9; 4]);
        let mut mask = Image::new(2, 2);
        binarize(&angle, 0.0, &mut mask);
        assert!(mask.as_slice().iter().all(|&v| v == 255));
        binarize(&angle, 1.0, &mut mask);
        assert!(mask.as_slice().iter().all(|&v| v == 0));
    }
}
