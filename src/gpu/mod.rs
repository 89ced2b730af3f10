// gpu/ — the wgpu compute implementation of the pipeline stages.

pub mod device;
pub mod engine;

pub use device::{GpuDevice, GpuError, WorkgroupSize};
pub use engine::{GpuEngine, MAX_GPU_MEDIAN};
