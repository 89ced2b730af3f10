// kernels.rs — Binomial smoothing kernels.
//
// The binomial blur buckets the configured averaging range into one of
// three fixed separable kernels. The 2D kernel is the outer product of the
// 1-D row with itself; the normalization constant is the square of the row
// sum (4² = 16, 16² = 256, 64² = 4096), so dividing the weighted sum by it
// preserves magnitude exactly.

/// 1-D binomial rows, finest to coarsest.
const ROW_3: [f32; 3] = [1.0, 2.0, 1.0];
const ROW_5: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
const ROW_7: [f32; 7] = [1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0];

/// Map an averaging range to the 1-D binomial row, its half-width and the
/// 2D normalization constant.
///
/// Buckets: range ≤ 1 → identity (empty row, half 0, norm 1); ≤ 3 → 3-tap
/// (norm 16); ≤ 5 → 5-tap (norm 256); above → 7-tap (norm 4096).
pub fn binomial_row(range: usize) -> (&'static [f32], usize, f32) {
    if range <= 1 {
        (&[], 0, 1.0)
    } else if range <= 3 {
        (&ROW_3, 1, 16.0)
    } else if range <= 5 {
        (&ROW_5, 2, 256.0)
    } else {
        (&ROW_7, 3, 4096.0)
    }
}

/// Kernel half-width for an averaging range (0 for the identity bucket).
pub fn binomial_half_width(range: usize) -> usize {
    binomial_row(range).1
}
