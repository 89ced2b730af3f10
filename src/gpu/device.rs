// gpu/device.rs — wgpu device abstraction for the accelerated path.
//
// Responsibilities:
//   - Enumerate adapters and select the first hardware (non-CPU) one,
//     falling back to whatever exists so software Vulkan still works.
//   - Hold the device/queue pair and the workgroup configuration used by
//     every stage pipeline.
//
// Initialization failure is an ordinary `GpuError` — the backend layer
// converts it into "acceleration unavailable" with a logged diagnostic.
// Nothing here ever reaches the engine's callers as a panic or error.

use std::fmt;

/// A workgroup size configuration for 2D compute dispatches.
///
/// naga does not support `override` expressions inside `@workgroup_size()`,
/// so the dimensions are baked into the WGSL source at pipeline creation
/// via the `{{WG_X}}`/`{{WG_Y}}` placeholder tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// 16×8 = 128 invocations: four 32-wide warps / two 64-wide wavefronts,
    /// with the 16-wide x dimension matching row-major image layout.
    pub const DEFAULT: WorkgroupSize = WorkgroupSize { x: 16, y: 8 };

    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Substitute the placeholder tokens in a WGSL template.
    pub fn specialize(&self, shader_template: &str) -> String {
        shader_template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// The core GPU context: device, queue and active workgroup size.
///
/// Expensive to create (instance + device initialization); the engine
/// creates it once at construction and keeps it for its lifetime.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue`.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` on the best available adapter.
    ///
    /// # Errors
    /// Returns `Err` if no adapter is found or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        // Tier 1: real hardware. Tier 2: take anything, software included —
        // a llvmpipe run is still a valid equivalence check.
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .find(|a| {
                matches!(
                    a.get_info().device_type,
                    wgpu::DeviceType::DiscreteGpu
                        | wgpu::DeviceType::IntegratedGpu
                        | wgpu::DeviceType::VirtualGpu
                        | wgpu::DeviceType::Other
                )
            })
            .or_else(|| {
                instance
                    .enumerate_adapters(wgpu::Backends::PRIMARY)
                    .into_iter()
                    .next()
            })
            .ok_or(GpuError::NoSuitableAdapter)?;

        let info = adapter.get_info();
        log::debug!(
            "compute adapter: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("depthedge"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_name: info.name,
            workgroup_size: WorkgroupSize::DEFAULT,
            _instance: instance,
        })
    }

    /// Workgroup counts covering a raster of the given size, with ceiling
    /// division so partial workgroups at the right/bottom edge are included.
    /// Shaders guard against the resulting out-of-bounds invocations.
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        let dx = img_w.div_ceil(self.workgroup_size.x);
        let dy = img_h.div_ceil(self.workgroup_size.y);
        (dx, dy)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {} }}",
            self.adapter_name, self.workgroup_size
        )
    }
}

/// Errors from GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// No compute-capable adapter was found.
    NoSuitableAdapter,
    /// The device request failed (driver issue, unsupported limits).
    DeviceRequest(wgpu::RequestDeviceError),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoSuitableAdapter => {
                write!(f, "no compute-capable adapter found")
            }
            GpuError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceRequest(e) => Some(e),
            GpuError::NoSuitableAdapter => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_total() {
        assert_eq!(WorkgroupSize::DEFAULT.total(), 128);
    }

    #[test]
    fn test_specialize_substitutes_tokens() {
        let src = "@compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)";
        let out = WorkgroupSize { x: 16, y: 8 }.specialize(src);
        assert_eq!(out, "@compute @workgroup_size(16, 8, 1)");
    }

    #[test]
    fn test_dispatch_size_ceiling() {
        // Pure function of the workgroup size — no device needed.
        let ws = WorkgroupSize::DEFAULT;
        assert_eq!(640u32.div_ceil(ws.x), 40);
        assert_eq!(480u32.div_ceil(ws.y), 60);
        assert_eq!(100u32.div_ceil(ws.x), 7); // partial workgroup included
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_device_init() {
        let gpu = GpuDevice::new().expect("should initialise a compute device");
        println!("{gpu}");
    }
}
