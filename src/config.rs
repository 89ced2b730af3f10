// config.rs — Engine configuration with eager, typed validation.
//
// An even median size or a zero range would silently corrupt the border
// rules, so the modes are closed enums (an "unknown aggregation mode"
// cannot be constructed) and `validate()` rejects the remaining bad values
// with a typed error before any buffer is touched. Every parameter can
// change between frames; the raster size cannot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the raw normal field is smoothed before edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMode {
    /// Pass raw normals through unchanged.
    None,
    /// Unweighted mean over a (2r+1)² window, r = `normal_averaging_range`.
    BoxAverage,
    /// Separable binomial kernel; `normal_averaging_range` is bucketed into
    /// a 3×3, 5×5 or 7×7 kernel (identity for range ≤ 1).
    BinomialBlur,
}

/// How the eight per-direction scores combine into one angle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeAggregation {
    /// Minimum of the eight scores — any one divergent direction flags the
    /// pixel as non-flat. Maximally sensitive.
    Min,
    /// Arithmetic mean of the eight scores — smoother response.
    Mean,
}

/// Depth value reserved by the range sensor for "no measurement".
pub const DEFAULT_DEPTH_SENTINEL: f32 = 2047.0;

/// All tunable parameters of the crease-detection pipeline.
///
/// Defaults: 3×3 median, normal range 2, averaging range 1 with box
/// smoothing, Min aggregation over range 3, binarization threshold 0.89.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetectorConfig {
    /// Median filter window size. Odd, ≥ 1 (1 disables the filter in
    /// effect: the window is a single pixel).
    pub median_filter_size: usize,
    /// Finite-difference stencil radius for normal estimation. ≥ 1.
    pub normal_range: usize,
    /// Smoothing radius (box) or kernel-selection value (binomial). ≥ 0.
    pub normal_averaging_range: usize,
    /// Smoothing strategy for the normal field.
    pub smoothing: SmoothingMode,
    /// Aggregation of the eight direction scores.
    pub edge_aggregation: EdgeAggregation,
    /// Maximum step distance along each of the eight directions. ≥ 1.
    pub edge_range: usize,
    /// Threshold applied to the angle image; scores above it are flat (255).
    pub binarization_threshold: f32,
    /// Depth value that marks a pixel as unmeasured.
    pub depth_sentinel: f32,
    /// Request the accelerated path when a device is available.
    pub acceleration_enabled: bool,
}

impl Default for EdgeDetectorConfig {
    fn default() -> Self {
        EdgeDetectorConfig {
            median_filter_size: 3,
            normal_range: 2,
            normal_averaging_range: 1,
            smoothing: SmoothingMode::BoxAverage,
            edge_aggregation: EdgeAggregation::Min,
            edge_range: 3,
            binarization_threshold: 0.89,
            depth_sentinel: DEFAULT_DEPTH_SENTINEL,
            acceleration_enabled: true,
        }
    }
}

impl EdgeDetectorConfig {
    /// Check every parameter, failing fast on the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.median_filter_size % 2 == 0 || self.median_filter_size == 0 {
            return Err(ConfigError::MedianSizeNotOdd {
                size: self.median_filter_size,
            });
        }
        if self.normal_range == 0 {
            return Err(ConfigError::RangeTooSmall {
                name: "normal_range",
                value: self.normal_range,
                min: 1,
            });
        }
        if self.edge_range == 0 {
            return Err(ConfigError::RangeTooSmall {
                name: "edge_range",
                value: self.edge_range,
                min: 1,
            });
        }
        if !self.binarization_threshold.is_finite() {
            return Err(ConfigError::ThresholdNotFinite {
                value: self.binarization_threshold,
            });
        }
        Ok(())
    }

    /// The widest border strip any configured stage leaves untouched.
    /// Useful for sizing test assertions; the stages themselves each apply
    /// their own radius.
    pub fn max_border(&self) -> usize {
        let median = self.median_filter_size / 2;
        let smooth = match self.smoothing {
            SmoothingMode::None => 0,
            SmoothingMode::BoxAverage => self.normal_averaging_range,
            SmoothingMode::BinomialBlur => {
                crate::kernels::binomial_half_width(self.normal_averaging_range)
            }
        };
        median
            .max(self.normal_range)
            .max(smooth)
            .max(self.edge_range)
    }
}

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Median filter windows must have a center pixel.
    MedianSizeNotOdd { size: usize },
    /// A stencil radius below its minimum would break the border rules.
    RangeTooSmall {
        name: &'static str,
        value: usize,
        min: usize,
    },
    /// NaN/Inf thresholds make the binarizer non-monotone.
    ThresholdNotFinite { value: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MedianSizeNotOdd { size } => {
                write!(f, "median filter size must be odd and >= 1 (got {size})")
            }
            ConfigError::RangeTooSmall { name, value, min } => {
                write!(f, "{name} must be >= {min} (got {value})")
            }
            ConfigError::ThresholdNotFinite { value } => {
                write!(f, "binarization threshold must be finite (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
