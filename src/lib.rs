// depthedge: crease and object-edge detection on depth images
// CPU reference pipeline plus a wgpu compute implementation
//
// Reference: Uckermann, Haschke, Ritter — "Real-time 3D segmentation of
// cluttered scenes for robot grasping" (Humanoids 2012)

pub mod backend;
pub mod binarize;
pub mod config;
pub mod detector;
pub mod edges;
pub mod gpu;
pub mod image;
pub mod kernels;
pub mod median;
pub mod normal;
pub mod normals;
pub mod world;

pub use backend::Backend;
pub use config::{
    ConfigError, EdgeAggregation, EdgeDetectorConfig, SmoothingMode, DEFAULT_DEPTH_SENTINEL,
};
pub use detector::{DepthEdgeDetector, Resolution};
pub use image::Image;
pub use normal::{Normal, NormalField, Rgb8Image};
