//! Ray-march shadow engine as a single `wgpu` compute dispatch.

use crate::consts::{NO_DATA_THRESHOLD, SHADOW_ALPHA, SHADOW_TINT};
use crate::errors::UmbraError;
use crate::grid::ElevationGrid;
use crate::mask::ShadowMask;
use crate::raymarch::{RayMarchPolicy, SampleMode};
use crate::sun::SunPosition;
use tracing::{debug, info};

const WORKGROUP_SIZE: u32 = 16;

/// Uniform buffer matching `MarchParams` in `shaders/shadow_march.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MarchParams {
    grid_width: u32,
    grid_height: u32,
    out_width: u32,
    out_height: u32,
    offset: [f32; 2],
    scale: [f32; 2],
    texel: [f32; 2],
    sun_dir: [f32; 2],
    tan_altitude: f32,
    meters_per_pixel: f32,
    step_pixels: f32,
    max_steps: u32,
    max_distance: f32,
    tolerance: f32,
    edge_fade: f32,
    bilinear: u32,
    no_data_threshold: f32,
    shadow_alpha: f32,
    tint: u32,
    _padding: u32,
}

impl MarchParams {
    fn new(grid: &ElevationGrid, sun: &SunPosition, policy: &RayMarchPolicy) -> Self {
        let window = grid.visible;
        let grid_w = grid.width as f32;
        let grid_h = grid.height as f32;
        let geometry = sun.geometry();
        let [r, g, b] = SHADOW_TINT;

        MarchParams {
            grid_width: grid.width as u32,
            grid_height: grid.height as u32,
            out_width: window.width as u32,
            out_height: window.height as u32,
            offset: [window.x0 as f32 / grid_w, window.y0 as f32 / grid_h],
            scale: [window.width as f32 / grid_w, window.height as f32 / grid_h],
            texel: [1.0 / grid_w, 1.0 / grid_h],
            sun_dir: [geometry.dir_x as f32, geometry.dir_y as f32],
            tan_altitude: geometry.tan_altitude as f32,
            meters_per_pixel: grid.meters_per_pixel as f32,
            step_pixels: policy.step_pixels as f32,
            max_steps: policy.step_count(grid.meters_per_pixel),
            max_distance: policy.max_distance_m as f32,
            tolerance: policy.tolerance_m as f32,
            edge_fade: policy.edge_fade as f32,
            bilinear: (policy.sample_mode == SampleMode::Bilinear) as u32,
            no_data_threshold: NO_DATA_THRESHOLD,
            shadow_alpha: SHADOW_ALPHA as f32,
            tint: r as u32 | (g as u32) << 8 | (b as u32) << 16,
            _padding: 0,
        }
    }
}

/// Device, queue and the compiled ray-march pipeline.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    adapter_name: String,
}

impl GpuContext {
    pub async fn new() -> Result<Self, UmbraError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| UmbraError::Gpu(format!("no suitable adapter: {e:?}")))?;

        let adapter_limits = adapter.limits();
        let mut limits = wgpu::Limits::default();
        limits.max_buffer_size = adapter_limits.max_buffer_size;
        limits.max_storage_buffer_binding_size =
            adapter_limits.max_storage_buffer_binding_size;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Shadow March Device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| UmbraError::Gpu(format!("failed to create device: {e}")))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow March Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/shadow_march.wgsl").into()),
        });

        let buffer_entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow March Bind Group Layout"),
            entries: &[
                // params
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                // elevation
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                // packed RGBA output
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow March Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Shadow March Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(GpuContext {
            device,
            queue,
            pipeline,
            bind_group_layout,
            adapter_name: adapter.get_info().name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }
}

/// Buffers sized for one grid/output shape, reused while the shape stays.
struct MarchBuffers {
    grid_len: usize,
    out_len: usize,
    params: wgpu::Buffer,
    elevation: wgpu::Buffer,
    output: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl MarchBuffers {
    fn new(context: &GpuContext, grid_len: usize, out_len: usize) -> Self {
        let make_buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let out_size = (out_len * std::mem::size_of::<u32>()) as u64;
        let params = make_buffer(
            "March Params Buffer",
            std::mem::size_of::<MarchParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let elevation = make_buffer(
            "Elevation Buffer",
            (grid_len * std::mem::size_of::<f32>()) as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let output = make_buffer(
            "Shadow Output Buffer",
            out_size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging = make_buffer(
            "Shadow Staging Buffer",
            out_size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow March Bind Group"),
            layout: &context.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: elevation.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        MarchBuffers {
            grid_len,
            out_len,
            params,
            elevation,
            output,
            staging,
            bind_group,
        }
    }
}

/// Owns the GPU for shadow rendering. Not `Clone`: `render` needs exclusive
/// access, so callers sharing an engine have to put it behind a mutex.
pub struct GpuShadowEngine {
    context: GpuContext,
    policy: RayMarchPolicy,
    buffers: Option<MarchBuffers>,
}

impl GpuShadowEngine {
    pub async fn new(policy: RayMarchPolicy) -> Result<Self, UmbraError> {
        let context = GpuContext::new().await?;
        info!(adapter = context.adapter_name(), "GPU shadow engine ready");
        Ok(GpuShadowEngine {
            context,
            policy,
            buffers: None,
        })
    }

    pub fn policy(&self) -> &RayMarchPolicy {
        &self.policy
    }

    pub fn adapter_name(&self) -> &str {
        self.context.adapter_name()
    }

    /// Computes the shadow mask of the grid's visible window.
    pub fn render(
        &mut self,
        grid: &ElevationGrid,
        sun: &SunPosition,
    ) -> Result<ShadowMask, UmbraError> {
        let window = grid.visible;
        let grid_len = grid.width * grid.height;
        let out_len = window.width * window.height;
        if out_len == 0 {
            return Ok(ShadowMask::new(window.width, window.height));
        }

        let reuse = self
            .buffers
            .as_ref()
            .is_some_and(|b| b.grid_len == grid_len && b.out_len == out_len);
        if !reuse {
            debug!(grid_len, out_len, "allocating GPU march buffers");
            self.buffers = Some(MarchBuffers::new(&self.context, grid_len, out_len));
        }
        let Some(buffers) = self.buffers.as_ref() else {
            return Err(UmbraError::Gpu("march buffers missing".to_string()));
        };

        let params = MarchParams::new(grid, sun, &self.policy);
        let queue = &self.context.queue;
        queue.write_buffer(&buffers.params, 0, bytemuck::bytes_of(&params));
        queue.write_buffer(&buffers.elevation, 0, bytemuck::cast_slice(grid.samples()));

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shadow March Encoder"),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Shadow March Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.context.pipeline);
            compute_pass.set_bind_group(0, &buffers.bind_group, &[]);
            compute_pass.dispatch_workgroups(
                (window.width as u32).div_ceil(WORKGROUP_SIZE),
                (window.height as u32).div_ceil(WORKGROUP_SIZE),
                1,
            );
        }

        let out_size = (out_len * std::mem::size_of::<u32>()) as u64;
        encoder.copy_buffer_to_buffer(&buffers.output, 0, &buffers.staging, 0, out_size);
        queue.submit(Some(encoder.finish()));

        let buffer_slice = buffers.staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // the receiver outlives the poll below
            let _ = sender.send(result);
        });

        self.context
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| UmbraError::Gpu(format!("device poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| UmbraError::Gpu(format!("readback channel closed: {e}")))?
            .map_err(|e| UmbraError::Gpu(format!("failed to map buffer: {e:?}")))?;

        let mask = {
            let data = buffer_slice.get_mapped_range();
            let packed: &[u32] = bytemuck::cast_slice(&data);
            ShadowMask::from_packed_rgba(window.width, window.height, packed)
        };
        buffers.staging.unmap();

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SHADOW_ALPHA;
    use crate::cpu::CpuShadowEngine;
    use crate::geo::GeoBounds;
    use crate::grid::VisibleWindow;
    use crate::testing::flat_grid;

    fn engine() -> Option<GpuShadowEngine> {
        match pollster::block_on(GpuShadowEngine::new(RayMarchPolicy::PARALLEL)) {
            Ok(engine) => Some(engine),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    /// A buffered grid with a north-south ridge in the east buffer.
    fn ridge_grid() -> ElevationGrid {
        let (width, height) = (96, 64);
        let mut samples = vec![200.0f32; width * height];
        for row in samples.chunks_exact_mut(width) {
            row[80..86].fill(3000.0);
        }
        ElevationGrid::from_samples(
            width,
            height,
            samples,
            GeoBounds::new(6.0, 45.0, 7.0, 46.0).unwrap(),
            20.0,
        )
        .with_visible_window(VisibleWindow {
            x0: 16,
            y0: 16,
            width: 48,
            height: 32,
            bounds: GeoBounds::new(6.2, 45.2, 6.7, 45.6).unwrap(),
        })
    }

    #[test]
    fn params_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<MarchParams>(), 96);
    }

    #[test]
    fn params_map_the_visible_window() {
        let grid = ridge_grid();
        let params = MarchParams::new(&grid, &SunPosition::new(90.0, 20.0), &RayMarchPolicy::PARALLEL);

        assert_eq!((params.out_width, params.out_height), (48, 32));
        assert_eq!(params.offset, [16.0 / 96.0, 16.0 / 64.0]);
        assert_eq!(params.scale, [0.5, 0.5]);
        assert_eq!(params.bilinear, 1);
        assert_eq!(params.max_steps, 266);
        assert_eq!(params.tint, 0x0026_1612);
    }

    #[test]
    fn flat_terrain_has_no_shadow() {
        let Some(mut engine) = engine() else {
            return;
        };
        let grid = flat_grid(40, 24, 1500.0, 30.0);
        let mask = engine.render(&grid, &SunPosition::new(135.0, 12.0)).unwrap();
        assert_eq!((mask.width, mask.height), (40, 24));
        assert_eq!(mask.shadowed_pixels(), 0);
    }

    #[test]
    fn matches_the_cpu_engine_with_the_same_policy() {
        let Some(mut engine) = engine() else {
            return;
        };
        let grid = ridge_grid();
        let sun = SunPosition::new(90.0, 20.0);

        let gpu = engine.render(&grid, &sun).unwrap();
        let cpu = CpuShadowEngine::new(RayMarchPolicy::PARALLEL)
            .render(&grid, &sun, None, None)
            .unwrap();

        // the ridge is 16..22 px east of the window: the whole window is dark
        assert_eq!(gpu.alpha(24, 16), SHADOW_ALPHA);
        let differing = gpu
            .alphas()
            .iter()
            .zip(cpu.alphas())
            .filter(|(a, b)| a.abs_diff(**b) > 1)
            .count();
        assert!(differing <= gpu.alphas().len() / 100, "{differing} pixels differ");
    }

    #[test]
    fn buffers_follow_the_grid_shape() {
        let Some(mut engine) = engine() else {
            return;
        };
        let sun = SunPosition::new(200.0, 30.0);
        engine.render(&flat_grid(16, 16, 0.0, 10.0), &sun).unwrap();
        let mask = engine.render(&flat_grid(33, 7, 0.0, 10.0), &sun).unwrap();
        assert_eq!((mask.width, mask.height), (33, 7));
    }
}
