// detector.rs — the crease-detection engine.
//
// Owns every intermediate raster of the pipeline, all allocated once at
// construction for a fixed resolution:
//
//   raw depth → median → normals → smoothing → angle image → mask
//                  │                   └→ world normals + RGB view
//                  └ (raw depth also feeds the sentinel check)
//
// Stages can be run individually (with externally supplied intermediates
// via the set_* inputs) or end-to-end through [`DepthEdgeDetector::calculate`].
// Backend dispatch is per stage: with acceleration active each stage runs
// on the compute engine, except the cases the shaders cannot express
// (oversized median windows), which drop to the CPU implementation for
// that stage only.

use nalgebra::Matrix4;

use crate::backend::Backend;
use crate::binarize;
use crate::config::{ConfigError, EdgeAggregation, EdgeDetectorConfig, SmoothingMode};
use crate::edges;
use crate::gpu::MAX_GPU_MEDIAN;
use crate::image::Image;
use crate::median;
use crate::normal::{NormalField, Rgb8Image};
use crate::normals;
use crate::world;

/// Raster size of the detector. The two sensor presets cover the common
/// structured-light cameras; anything else goes through `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 320×240.
    Qvga,
    /// 640×480.
    Vga,
    Custom { width: usize, height: usize },
}

impl Resolution {
    pub fn dims(&self) -> (usize, usize) {
        match *self {
            Resolution::Qvga => (320, 240),
            Resolution::Vga => (640, 480),
            Resolution::Custom { width, height } => (width, height),
        }
    }
}

/// Depth-image crease detector with CPU and GPU execution paths.
pub struct DepthEdgeDetector {
    config: EdgeDetectorConfig,
    backend: Backend,
    width: usize,
    height: usize,
    raw_depth: Image<f32>,
    filtered_depth: Image<f32>,
    normals: NormalField,
    smoothed: NormalField,
    angle: Image<f32>,
    mask: Image<u8>,
    world: NormalField,
    world_rgb: Rgb8Image,
}

impl DepthEdgeDetector {
    /// Build a detector for one resolution.
    ///
    /// Validates the configuration eagerly and, when acceleration is
    /// requested, probes for a compute device. A failed probe is not an
    /// error; the detector silently runs the CPU path (the downgrade is
    /// logged).
    ///
    /// # Errors
    /// Returns `Err` when the configuration is invalid.
    pub fn new(
        resolution: Resolution,
        config: EdgeDetectorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (width, height) = resolution.dims();
        let backend = if config.acceleration_enabled {
            Backend::detect(width, height)
        } else {
            Backend::Reference
        };
        log::debug!("detector {width}×{height}, backend {backend:?}");

        Ok(DepthEdgeDetector {
            config,
            backend,
            width,
            height,
            raw_depth: Image::new(width, height),
            filtered_depth: Image::new(width, height),
            normals: NormalField::new(width, height),
            smoothed: NormalField::new(width, height),
            angle: Image::new(width, height),
            mask: Image::new(width, height),
            world: NormalField::new(width, height),
            world_rgb: Rgb8Image::new(width, height),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn config(&self) -> &EdgeDetectorConfig {
        &self.config
    }

    /// True when a compute device was found at the last probe.
    pub fn is_acceleration_available(&self) -> bool {
        self.backend.is_accelerated()
    }

    /// True when the compute backend is active and will be used.
    pub fn is_acceleration_enabled(&self) -> bool {
        self.config.acceleration_enabled && self.backend.is_accelerated()
    }

    // ---- inputs ---------------------------------------------------------

    /// Load the raw depth image for the next frame.
    ///
    /// # Panics
    /// Panics if the raster size differs from the detector's resolution.
    pub fn set_depth_image(&mut self, depth: &Image<f32>) {
        self.raw_depth.copy_from(depth);
    }

    /// Inject a pre-filtered depth image, bypassing the median stage.
    pub fn set_filtered_depth_image(&mut self, depth: &Image<f32>) {
        self.filtered_depth.copy_from(depth);
    }

    /// Inject an externally computed angle image, bypassing everything up
    /// to the binarizer.
    pub fn set_angle_image(&mut self, angle: &Image<f32>) {
        self.angle.copy_from(angle);
    }

    // ---- stages ---------------------------------------------------------

    /// Median-filter the raw depth image.
    pub fn apply_median_filter(&mut self) {
        let k = self.config.median_filter_size;
        if let (Backend::Accelerated(engine), true) =
            (&self.backend, self.config.acceleration_enabled)
        {
            if k <= MAX_GPU_MEDIAN {
                engine.median_filter(&self.raw_depth, k, &mut self.filtered_depth);
                return;
            }
            log::debug!("median window {k} exceeds the compute kernel limit, using CPU filter");
        }
        median::median_filter(&self.raw_depth, k, &mut self.filtered_depth);
    }

    /// Estimate normals from the filtered depth, then smooth them according
    /// to the configured mode.
    pub fn apply_normal_calculation(&mut self) {
        let r = self.config.normal_range;
        match (&self.backend, self.config.acceleration_enabled) {
            (Backend::Accelerated(engine), true) => {
                engine.estimate_normals(&self.filtered_depth, r, &mut self.normals);
            }
            _ => normals::estimate_normals(&self.filtered_depth, r, &mut self.normals),
        }
        self.apply_normal_smoothing();
    }

    fn apply_normal_smoothing(&mut self) {
        let range = self.config.normal_averaging_range;
        let accelerated = self.config.acceleration_enabled;
        match (self.config.smoothing, &self.backend) {
            (SmoothingMode::None, _) => self.smoothed.copy_from(&self.normals),
            (SmoothingMode::BoxAverage, Backend::Accelerated(engine)) if accelerated => {
                engine.box_average(&self.normals, range, &mut self.smoothed);
            }
            (SmoothingMode::BoxAverage, _) => {
                normals::box_average(&self.normals, range, &mut self.smoothed);
            }
            (SmoothingMode::BinomialBlur, Backend::Accelerated(engine)) if accelerated => {
                engine.binomial_smooth(&self.normals, range, &mut self.smoothed);
            }
            (SmoothingMode::BinomialBlur, _) => {
                normals::binomial_smooth(&self.normals, range, &mut self.smoothed);
            }
        }
    }

    /// Compute the 8-direction angle image from the smoothed normals.
    pub fn apply_angle_image_calculation(&mut self) {
        let range = self.config.edge_range;
        let agg = self.config.edge_aggregation;
        match (&self.backend, self.config.acceleration_enabled) {
            (Backend::Accelerated(engine), true) => {
                engine.angle_image(&self.smoothed, range, agg, &mut self.angle);
            }
            _ => edges::angle_image(&self.smoothed, range, agg, &mut self.angle),
        }
    }

    /// Threshold the angle image into the 0/255 crease mask.
    pub fn apply_image_binarization(&mut self) {
        let t = self.config.binarization_threshold;
        match (&self.backend, self.config.acceleration_enabled) {
            (Backend::Accelerated(engine), true) => {
                engine.binarize(&self.angle, t, &mut self.mask);
            }
            _ => binarize::binarize(&self.angle, t, &mut self.mask),
        }
    }

    /// Rotate the (smoothed) normals into world space with the camera pose
    /// and render the RGB visualization. Pixels whose raw depth carries the
    /// sentinel value come out invalid/black.
    pub fn apply_world_normal_calculation(&mut self, pose: &Matrix4<f32>) {
        world::world_normals(
            &self.smoothed,
            &self.raw_depth,
            pose,
            self.config.depth_sentinel,
            &mut self.world,
            &mut self.world_rgb,
        );
    }

    /// Run the full crease pipeline on one depth frame.
    ///
    /// `median_filter` toggles the median stage (off: the raw image passes
    /// straight through). `smooth`/`use_binomial` select the smoothing mode
    /// for this and subsequent frames: off, box average, or binomial blur.
    pub fn calculate(
        &mut self,
        depth: &Image<f32>,
        median_filter: bool,
        smooth: bool,
        use_binomial: bool,
    ) -> &Image<u8> {
        self.config.smoothing = match (smooth, use_binomial) {
            (false, _) => SmoothingMode::None,
            (true, false) => SmoothingMode::BoxAverage,
            (true, true) => SmoothingMode::BinomialBlur,
        };

        self.set_depth_image(depth);
        if median_filter {
            self.apply_median_filter();
        } else {
            self.filtered_depth.copy_from(depth);
        }
        self.apply_normal_calculation();
        self.apply_angle_image_calculation();
        self.apply_image_binarization();
        &self.mask
    }

    // ---- outputs --------------------------------------------------------

    pub fn filtered_depth_image(&self) -> &Image<f32> {
        &self.filtered_depth
    }

    /// The normal field the edge stage consumes: smoothed per the configured
    /// mode, equal to [`Self::raw_normals`] under `SmoothingMode::None`.
    pub fn normals(&self) -> &NormalField {
        &self.smoothed
    }

    /// The pre-smoothing normal field.
    pub fn raw_normals(&self) -> &NormalField {
        &self.normals
    }

    pub fn angle_image(&self) -> &Image<f32> {
        &self.angle
    }

    pub fn binarized_angle_image(&self) -> &Image<u8> {
        &self.mask
    }

    pub fn world_normals(&self) -> &NormalField {
        &self.world
    }

    pub fn rgb_normal_image(&self) -> &Rgb8Image {
        &self.world_rgb
    }

    // ---- runtime configuration ------------------------------------------

    /// # Errors
    /// Returns `Err` for an even or zero window size.
    pub fn set_median_filter_size(&mut self, size: usize) -> Result<(), ConfigError> {
        self.update(|c| c.median_filter_size = size)
    }

    /// # Errors
    /// Returns `Err` for a zero range.
    pub fn set_normal_calculation_range(&mut self, range: usize) -> Result<(), ConfigError> {
        self.update(|c| c.normal_range = range)
    }

    pub fn set_normal_averaging_range(&mut self, range: usize) {
        self.config.normal_averaging_range = range;
    }

    pub fn set_smoothing_mode(&mut self, mode: SmoothingMode) {
        self.config.smoothing = mode;
    }

    pub fn set_edge_aggregation(&mut self, agg: EdgeAggregation) {
        self.config.edge_aggregation = agg;
    }

    /// # Errors
    /// Returns `Err` for a zero range.
    pub fn set_angle_neighborhood_range(&mut self, range: usize) -> Result<(), ConfigError> {
        self.update(|c| c.edge_range = range)
    }

    /// # Errors
    /// Returns `Err` for a NaN or infinite threshold.
    pub fn set_binarization_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        self.update(|c| c.binarization_threshold = threshold)
    }

    pub fn set_depth_sentinel(&mut self, sentinel: f32) {
        self.config.depth_sentinel = sentinel;
    }

    /// Toggle the accelerated path. Enabling it on a detector that was
    /// constructed without (or failed) a device probe re-probes now.
    pub fn set_acceleration_enabled(&mut self, enabled: bool) {
        self.config.acceleration_enabled = enabled;
        if enabled && !self.backend.is_accelerated() {
            self.backend = Backend::detect(self.width, self.height);
        }
    }

    /// Apply a single-field change, keeping the previous configuration when
    /// validation rejects the result.
    fn update(&mut self, change: impl FnOnce(&mut EdgeDetectorConfig)) -> Result<(), ConfigError> {
        let mut candidate = self.config.clone();
        change(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }
}
