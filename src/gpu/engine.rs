// gpu/engine.rs — compute pipelines and buffers for the accelerated path.
//
// One pipeline per stage, all sharing a single bind group layout:
//   binding 0  read-only storage  (stage input)
//   binding 1  read-write storage (stage output)
//   binding 2  uniform            (stage parameters)
//
// Host buffers stay authoritative: every stage uploads its input, runs one
// dispatch and blocks on the read-back. That keeps the stage boundary
// identical to the CPU path, so per-stage CPU fallbacks (oversized median
// windows, identity smoothing) never leave stale data on the device.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::EdgeAggregation;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::Image;
use crate::kernels;
use crate::normal::NormalField;

/// Largest median window the fixed-size shader array supports. Larger
/// windows fall back to the CPU filter.
pub const MAX_GPU_MEDIAN: usize = 9;

const MEDIAN_SRC: &str = include_str!("../shaders/median.wgsl");
const NORMALS_SRC: &str = include_str!("../shaders/normals.wgsl");
const SMOOTH_SRC: &str = include_str!("../shaders/smooth.wgsl");
const ANGLE_SRC: &str = include_str!("../shaders/angle.wgsl");
const BINARIZE_SRC: &str = include_str!("../shaders/binarize.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MedianParams {
    width: u32,
    height: u32,
    ksize: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct NormalParams {
    width: u32,
    height: u32,
    range: u32,
    _pad: u32,
}

/// Mirrors the WGSL `Params` struct in smooth.wgsl; `coeffs` sits on a
/// 16-byte boundary, hence the three pad floats.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SmoothParams {
    width: u32,
    height: u32,
    mode: u32,
    radius: u32,
    inv_norm: f32,
    _pad: [f32; 3],
    coeffs: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct AngleParams {
    width: u32,
    height: u32,
    range: u32,
    mode: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BinarizeParams {
    width: u32,
    height: u32,
    threshold: f32,
    _pad: u32,
}

/// Pack a symmetric 1-D binomial row into the vec4 the shader indexes by
/// absolute offset: `coeffs[k] = row[half + k]`.
fn pack_coeffs(row: &[f32], half: usize) -> [f32; 4] {
    let mut coeffs = [0.0f32; 4];
    for k in 0..=half {
        coeffs[k] = row[half + k];
    }
    coeffs
}

/// GPU implementation of every raster stage of the pipeline.
///
/// Fixed to one resolution: all storage buffers are allocated once at
/// construction and reused across frames.
pub struct GpuEngine {
    gpu: GpuDevice,
    width: u32,
    height: u32,
    bind_layout: wgpu::BindGroupLayout,
    median: wgpu::ComputePipeline,
    normals: wgpu::ComputePipeline,
    smooth: wgpu::ComputePipeline,
    angle: wgpu::ComputePipeline,
    binarize: wgpu::ComputePipeline,
    // Stage I/O. Scalar buffers carry f32 depth/angle images (and the u32
    // mask, same byte size); field buffers carry vec4 normals.
    scalar_in: wgpu::Buffer,
    scalar_out: wgpu::Buffer,
    field_in: wgpu::Buffer,
    field_out: wgpu::Buffer,
    readback: wgpu::Buffer,
}

impl GpuEngine {
    /// Initialize a device and build all stage pipelines for one resolution.
    ///
    /// # Errors
    /// Returns `Err` when no compute device is available.
    pub fn new(width: usize, height: usize) -> Result<Self, GpuError> {
        let gpu = GpuDevice::new()?;
        Ok(Self::with_device(gpu, width, height))
    }

    pub fn with_device(gpu: GpuDevice, width: usize, height: usize) -> Self {
        let device = &gpu.device;

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stage pipeline layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let median = build_pipeline(&gpu, &pipeline_layout, "median", MEDIAN_SRC, "median_filter");
        let normals = build_pipeline(
            &gpu,
            &pipeline_layout,
            "normals",
            NORMALS_SRC,
            "estimate_normals",
        );
        let smooth = build_pipeline(&gpu, &pipeline_layout, "smooth", SMOOTH_SRC, "smooth_normals");
        let angle = build_pipeline(&gpu, &pipeline_layout, "angle", ANGLE_SRC, "angle_image");
        let binarize = build_pipeline(&gpu, &pipeline_layout, "binarize", BINARIZE_SRC, "binarize");

        let scalar_bytes = (width * height * 4) as u64;
        let field_bytes = (width * height * 16) as u64;
        let scalar_in = storage_buffer(device, "scalar in", scalar_bytes, true);
        let scalar_out = storage_buffer(device, "scalar out", scalar_bytes, false);
        let field_in = storage_buffer(device, "field in", field_bytes, true);
        let field_out = storage_buffer(device, "field out", field_bytes, false);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: field_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        GpuEngine {
            gpu,
            width: width as u32,
            height: height as u32,
            bind_layout,
            median,
            normals,
            smooth,
            angle,
            binarize,
            scalar_in,
            scalar_out,
            field_in,
            field_out,
            readback,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_name
    }

    fn scalar_bytes(&self) -> u64 {
        (self.width * self.height * 4) as u64
    }

    fn field_bytes(&self) -> u64 {
        (self.width * self.height * 16) as u64
    }

    fn check_dims(&self, w: usize, h: usize) {
        assert_eq!(
            (w, h),
            (self.width as usize, self.height as usize),
            "raster size does not match the engine's fixed resolution"
        );
    }

    /// k×k median filter; `ksize` must be odd and at most [`MAX_GPU_MEDIAN`].
    pub fn median_filter(&self, src: &Image<f32>, ksize: usize, dst: &mut Image<f32>) {
        self.check_dims(src.width(), src.height());
        self.check_dims(dst.width(), dst.height());
        assert!(ksize % 2 == 1 && ksize <= MAX_GPU_MEDIAN);

        self.gpu
            .queue
            .write_buffer(&self.scalar_in, 0, bytemuck::cast_slice(src.as_slice()));
        let params = MedianParams {
            width: self.width,
            height: self.height,
            ksize: ksize as u32,
            _pad: 0,
        };
        self.run_stage(
            &self.median,
            &self.scalar_in,
            &self.scalar_out,
            bytemuck::bytes_of(&params),
            self.scalar_bytes(),
        );
        self.read_back(self.scalar_bytes(), bytemuck::cast_slice_mut(dst.as_mut_slice()));
    }

    /// Finite-difference normal estimation over a stencil of radius `range`.
    pub fn estimate_normals(&self, depth: &Image<f32>, range: usize, dst: &mut NormalField) {
        self.check_dims(depth.width(), depth.height());
        self.check_dims(dst.width(), dst.height());

        self.gpu
            .queue
            .write_buffer(&self.scalar_in, 0, bytemuck::cast_slice(depth.as_slice()));
        let params = NormalParams {
            width: self.width,
            height: self.height,
            range: range as u32,
            _pad: 0,
        };
        self.run_stage(
            &self.normals,
            &self.scalar_in,
            &self.field_out,
            bytemuck::bytes_of(&params),
            self.field_bytes(),
        );
        self.read_back(self.field_bytes(), bytemuck::cast_slice_mut(dst.as_mut_slice()));
    }

    /// Box average with radius `radius` (the normal averaging range).
    pub fn box_average(&self, src: &NormalField, radius: usize, dst: &mut NormalField) {
        self.check_dims(src.width(), src.height());
        self.check_dims(dst.width(), dst.height());
        if radius == 0 {
            dst.copy_from(src);
            return;
        }
        let window = (2 * radius + 1) as f32;
        let params = SmoothParams {
            width: self.width,
            height: self.height,
            mode: 0,
            radius: radius as u32,
            inv_norm: 1.0 / (window * window),
            _pad: [0.0; 3],
            coeffs: [0.0; 4],
        };
        self.run_smooth(src, &params, dst);
    }

    /// Binomial blur; `range` selects the kernel bucket (see [`kernels`]).
    pub fn binomial_smooth(&self, src: &NormalField, range: usize, dst: &mut NormalField) {
        self.check_dims(src.width(), src.height());
        self.check_dims(dst.width(), dst.height());
        let (row, half, norm) = kernels::binomial_row(range);
        if half == 0 {
            dst.copy_from(src);
            return;
        }
        let params = SmoothParams {
            width: self.width,
            height: self.height,
            mode: 1,
            radius: half as u32,
            inv_norm: 1.0 / norm,
            _pad: [0.0; 3],
            coeffs: pack_coeffs(row, half),
        };
        self.run_smooth(src, &params, dst);
    }

    fn run_smooth(&self, src: &NormalField, params: &SmoothParams, dst: &mut NormalField) {
        self.gpu
            .queue
            .write_buffer(&self.field_in, 0, bytemuck::cast_slice(src.as_slice()));
        self.run_stage(
            &self.smooth,
            &self.field_in,
            &self.field_out,
            bytemuck::bytes_of(params),
            self.field_bytes(),
        );
        self.read_back(self.field_bytes(), bytemuck::cast_slice_mut(dst.as_mut_slice()));
    }

    /// 8-direction rectified-angle image.
    pub fn angle_image(
        &self,
        normals: &NormalField,
        range: usize,
        aggregation: EdgeAggregation,
        dst: &mut Image<f32>,
    ) {
        self.check_dims(normals.width(), normals.height());
        self.check_dims(dst.width(), dst.height());

        self.gpu
            .queue
            .write_buffer(&self.field_in, 0, bytemuck::cast_slice(normals.as_slice()));
        let params = AngleParams {
            width: self.width,
            height: self.height,
            range: range as u32,
            mode: match aggregation {
                EdgeAggregation::Min => 0,
                EdgeAggregation::Mean => 1,
            },
        };
        self.run_stage(
            &self.angle,
            &self.field_in,
            &self.scalar_out,
            bytemuck::bytes_of(&params),
            self.scalar_bytes(),
        );
        self.read_back(self.scalar_bytes(), bytemuck::cast_slice_mut(dst.as_mut_slice()));
    }

    /// Threshold the angle image into the 0/255 crease mask.
    pub fn binarize(&self, angle: &Image<f32>, threshold: f32, dst: &mut Image<u8>) {
        self.check_dims(angle.width(), angle.height());
        self.check_dims(dst.width(), dst.height());

        self.gpu
            .queue
            .write_buffer(&self.scalar_in, 0, bytemuck::cast_slice(angle.as_slice()));
        let params = BinarizeParams {
            width: self.width,
            height: self.height,
            threshold,
            _pad: 0,
        };
        self.run_stage(
            &self.binarize,
            &self.scalar_in,
            &self.scalar_out,
            bytemuck::bytes_of(&params),
            self.scalar_bytes(),
        );
        // The shader writes one u32 per pixel; narrow to u8 on the host.
        let mut wide = vec![0u32; (self.width * self.height) as usize];
        self.read_back(self.scalar_bytes(), bytemuck::cast_slice_mut(&mut wide));
        for (d, w) in dst.as_mut_slice().iter_mut().zip(&wide) {
            *d = *w as u8;
        }
    }

    /// Encode one dispatch plus the copy into the read-back buffer, submit.
    fn run_stage(
        &self,
        pipeline: &wgpu::ComputePipeline,
        input: &wgpu::Buffer,
        output: &wgpu::Buffer,
        params: &[u8],
        out_bytes: u64,
    ) {
        let uniform = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stage params"),
                contents: params,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stage bindings"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let (dx, dy) = self.gpu.dispatch_size(self.width, self.height);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(dx, dy, 1);
        }
        encoder.copy_buffer_to_buffer(output, 0, &self.readback, 0, out_bytes);
        self.gpu.queue.submit(Some(encoder.finish()));
    }

    /// Block until the read-back buffer is mapped and copy it into `dst`.
    ///
    /// Mapping only fails when the device is lost, which is unrecoverable
    /// at this level, so the failure is a panic rather than a `Result`.
    fn read_back(&self, out_bytes: u64, dst: &mut [u8]) {
        let slice = self.readback.slice(..out_bytes);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .expect("map_async callback dropped")
            .expect("failed to map read-back buffer");
        {
            let view = slice.get_mapped_range();
            dst.copy_from_slice(&view);
        }
        self.readback.unmap();
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_buffer(device: &wgpu::Device, label: &str, size: u64, upload: bool) -> wgpu::Buffer {
    let usage = if upload {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
    } else {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC
    };
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

fn build_pipeline(
    gpu: &GpuDevice,
    layout: &wgpu::PipelineLayout,
    label: &str,
    template: &str,
    entry: &str,
) -> wgpu::ComputePipeline {
    let source = gpu.workgroup_size.specialize(template);
    let module = gpu
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
    gpu.device
        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            module: &module,
            entry_point: entry,
            compilation_options: Default::default(),
            cache: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{binarize, edges, median, normals};

    #[test]
    fn test_pack_coeffs_three_tap() {
        let (row, half, _) = kernels::binomial_row(3);
        assert_eq!(pack_coeffs(row, half), [2.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pack_coeffs_seven_tap() {
        let (row, half, _) = kernels::binomial_row(7);
        assert_eq!(pack_coeffs(row, half), [20.0, 15.0, 6.0, 1.0]);
    }

    #[test]
    fn test_shader_templates_carry_tokens() {
        for src in [MEDIAN_SRC, NORMALS_SRC, SMOOTH_SRC, ANGLE_SRC, BINARIZE_SRC] {
            assert!(src.contains("{{WG_X}}"), "missing WG_X token");
            assert!(src.contains("{{WG_Y}}"), "missing WG_Y token");
        }
    }

    fn ramp_depth(w: usize, h: usize) -> Image<f32> {
        let mut img = Image::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.set(x, y, 900.0 + 0.8 * x as f32 + 1.3 * y as f32);
            }
        }
        img
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_median_matches_cpu() {
        let engine = GpuEngine::new(40, 30).expect("device");
        let src = ramp_depth(40, 30);
        let mut gpu_out = Image::new(40, 30);
        let mut cpu_out = Image::new(40, 30);
        engine.median_filter(&src, 3, &mut gpu_out);
        median::median_filter(&src, 3, &mut cpu_out);
        for (a, b) in gpu_out.as_slice().iter().zip(cpu_out.as_slice()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_full_stage_chain_matches_cpu() {
        let (w, h) = (48, 32);
        let engine = GpuEngine::new(w, h).expect("device");
        let depth = ramp_depth(w, h);

        let mut gpu_n = NormalField::new(w, h);
        let mut cpu_n = NormalField::new(w, h);
        engine.estimate_normals(&depth, 2, &mut gpu_n);
        normals::estimate_normals(&depth, 2, &mut cpu_n);

        let mut gpu_s = NormalField::new(w, h);
        let mut cpu_s = NormalField::new(w, h);
        engine.binomial_smooth(&gpu_n, 3, &mut gpu_s);
        normals::binomial_smooth(&cpu_n, 3, &mut cpu_s);

        let mut gpu_a = Image::new(w, h);
        let mut cpu_a = Image::new(w, h);
        engine.angle_image(&gpu_s, 3, EdgeAggregation::Min, &mut gpu_a);
        edges::angle_image(&cpu_s, 3, EdgeAggregation::Min, &mut cpu_a);
        for (a, b) in gpu_a.as_slice().iter().zip(cpu_a.as_slice()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }

        let mut gpu_m = Image::new(w, h);
        let mut cpu_m = Image::new(w, h);
        engine.binarize(&gpu_a, 0.89, &mut gpu_m);
        binarize::binarize(&cpu_a, 0.89, &mut cpu_m);
        assert_eq!(gpu_m.as_slice(), cpu_m.as_slice());
    }
}
