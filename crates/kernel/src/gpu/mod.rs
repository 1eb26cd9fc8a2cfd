//! GPU (Vulkan/Metal via wgpu) implementation of the spatial index.
//!
//! `GpuIndex` implements `SpatialIndex` using wgpu compute shaders. Each
//! rebuild dispatches five passes with an implicit global barrier at every
//! pass boundary:
//!
//! 1. `bin_particles`    -- particle -> cell assignment + atomic count
//! 2. `exclusive_scan`   -- cell counts -> cell offsets
//! 3. `scatter_particles`-- atomic slot claim, write permutation
//! 4. `count_neighbors`  -- 3x3x3 stencil sizing pass
//! 5. `exclusive_scan`   -- neighbor counts -> neighbor offsets
//! 6. `fill_neighbors`   -- stencil fill pass into the flat list
//!
//! The total partner count is read back between passes 5 and 6 to size the
//! flat neighbor array, mirroring the count-then-fill discipline that avoids
//! dynamic allocation inside kernels. Atomic increments are the only
//! intra-pass synchronization, so the permutation's intra-cell order is
//! non-deterministic across runs; consumers must compare multisets.

pub mod buffers;

use buffers::{read_u32, GpuIndexBuffers, GpuIndexParams, GpuScanParams};

use crate::cell_list::{CellList, GridRegion};
use crate::neighbor_list::NeighborList;
use crate::SpatialIndex;

/// Error returned when GPU initialization fails.
#[derive(Debug)]
pub struct GpuInitError(pub String);

impl std::fmt::Display for GpuInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GPU initialization failed: {}", self.0)
    }
}

impl std::error::Error for GpuInitError {}

/// Check whether a suitable GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// GPU-accelerated spatial index for one sub-domain.
pub struct GpuIndex {
    device: wgpu::Device,
    queue: wgpu::Queue,

    pipeline_bin: wgpu::ComputePipeline,
    pipeline_scan: wgpu::ComputePipeline,
    pipeline_scatter: wgpu::ComputePipeline,
    pipeline_count: wgpu::ComputePipeline,
    pipeline_fill: wgpu::ComputePipeline,

    bufs: GpuIndexBuffers,

    region: GridRegion,
    cutoff: f32,

    // Host-side copies of the last rebuild, refreshed on every rebuild().
    cell_list: CellList,
    neighbor_list: NeighborList,
}

/// Number of workgroups needed to cover `n` items at the given group size.
fn dispatch_size(n: usize, workgroup_size: u32) -> u32 {
    ((n as u32).max(1)).div_ceil(workgroup_size)
}

impl GpuIndex {
    /// Create a GPU spatial index over `region` with capacity for
    /// `max_particles` particles (real + ghost).
    ///
    /// Returns `Err(GpuInitError)` if no suitable adapter is found, allowing
    /// callers to fall back to `CpuIndex`.
    pub fn new(
        region: GridRegion,
        cutoff: f32,
        max_particles: usize,
    ) -> Result<Self, GpuInitError> {
        // --- Device initialization ---
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GpuInitError("No suitable GPU adapter found".into()))?;

        tracing::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("spatial_index_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| GpuInitError(format!("Failed to create device: {e}")))?;

        // --- Compute pipelines (auto layout, one bind group each) ---
        let make_pipeline = |label: &str, src: &str, entry: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let pipeline_bin = make_pipeline(
            "cell_bin",
            include_str!("shaders/cell_bin.wgsl"),
            "bin_particles",
        );
        let pipeline_scan = make_pipeline(
            "prefix_sum",
            include_str!("shaders/prefix_sum.wgsl"),
            "exclusive_scan",
        );
        let pipeline_scatter = make_pipeline(
            "cell_scatter",
            include_str!("shaders/cell_scatter.wgsl"),
            "scatter_particles",
        );
        let pipeline_count = make_pipeline(
            "neighbor_count",
            include_str!("shaders/neighbor_count.wgsl"),
            "count_neighbors",
        );
        let pipeline_fill = make_pipeline(
            "neighbor_fill",
            include_str!("shaders/neighbor_fill.wgsl"),
            "fill_neighbors",
        );

        let params = Self::make_params(&region, cutoff, 0);
        let bufs = GpuIndexBuffers::new(&device, &params, max_particles, region.total_cells());

        Ok(Self {
            device,
            queue,
            pipeline_bin,
            pipeline_scan,
            pipeline_scatter,
            pipeline_count,
            pipeline_fill,
            bufs,
            region,
            cutoff,
            cell_list: CellList::default(),
            neighbor_list: NeighborList::default(),
        })
    }

    fn make_params(region: &GridRegion, cutoff: f32, n: usize) -> GpuIndexParams {
        GpuIndexParams {
            n_particles: n as u32,
            dim_x: region.dims[0],
            dim_y: region.dims[1],
            dim_z: region.dims[2],
            origin_x: region.origin[0],
            origin_y: region.origin[1],
            origin_z: region.origin[2],
            cutoff_sq: cutoff * cutoff,
            inv_cell_x: region.inv_cell_size[0],
            inv_cell_y: region.inv_cell_size[1],
            inv_cell_z: region.inv_cell_size[2],
            _pad0: 0.0,
            lo_x: region.lo[0],
            lo_y: region.lo[1],
            lo_z: region.lo[2],
            _pad1: 0,
        }
    }

    /// Encode and submit the cell-list passes plus the neighbor sizing pass.
    fn submit_sizing(&self, n: usize) {
        let wg_particles = dispatch_size(n, 256);

        let bg_bin = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_bin"),
            layout: &self.pipeline_bin.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.params),
                bind(1, &self.bufs.pos_x),
                bind(2, &self.bufs.pos_y),
                bind(3, &self.bufs.pos_z),
                bind(4, &self.bufs.cell_ids),
                bind(5, &self.bufs.cell_counts),
            ],
        });
        let bg_scan_cells = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_scan_cells"),
            layout: &self.pipeline_scan.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.cell_counts),
                bind(1, &self.bufs.cell_offsets),
                bind(2, &self.bufs.cells_scan_params),
            ],
        });
        let bg_scatter = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_scatter"),
            layout: &self.pipeline_scatter.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.params),
                bind(1, &self.bufs.cell_ids),
                bind(2, &self.bufs.cell_offsets),
                bind(3, &self.bufs.cursors),
                bind(4, &self.bufs.permutation),
            ],
        });
        let bg_count = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_count"),
            layout: &self.pipeline_count.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.params),
                bind(1, &self.bufs.pos_x),
                bind(2, &self.bufs.pos_y),
                bind(3, &self.bufs.pos_z),
                bind(4, &self.bufs.cell_offsets),
                bind(5, &self.bufs.permutation),
                bind(6, &self.bufs.nbor_counts),
            ],
        });
        let bg_scan_particles = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_scan_particles"),
            layout: &self.pipeline_scan.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.nbor_counts),
                bind(1, &self.bufs.nbor_offsets),
                bind(2, &self.bufs.particles_scan_params),
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("index_sizing"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cell_bin"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_bin);
            pass.set_bind_group(0, &bg_bin, &[]);
            pass.dispatch_workgroups(wg_particles, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cell_prefix"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_scan);
            pass.set_bind_group(0, &bg_scan_cells, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cell_scatter"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_scatter);
            pass.set_bind_group(0, &bg_scatter, &[]);
            pass.dispatch_workgroups(wg_particles, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("neighbor_count"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_count);
            pass.set_bind_group(0, &bg_count, &[]);
            pass.dispatch_workgroups(wg_particles, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("neighbor_prefix"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_scan);
            pass.set_bind_group(0, &bg_scan_particles, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Encode and submit the fill pass. `nbor_list` must already have
    /// capacity for the total partner count.
    fn submit_fill(&self, n: usize) {
        let bg_fill = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg_fill"),
            layout: &self.pipeline_fill.get_bind_group_layout(0),
            entries: &[
                bind(0, &self.bufs.params),
                bind(1, &self.bufs.pos_x),
                bind(2, &self.bufs.pos_y),
                bind(3, &self.bufs.pos_z),
                bind(4, &self.bufs.cell_offsets),
                bind(5, &self.bufs.permutation),
                bind(6, &self.bufs.nbor_offsets),
                bind(7, &self.bufs.nbor_list),
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("index_fill"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("neighbor_fill"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline_fill);
            pass.set_bind_group(0, &bg_fill, &[]);
            pass.dispatch_workgroups(dispatch_size(n, 256), 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

impl SpatialIndex for GpuIndex {
    fn rebuild(&mut self, x: &[f32], y: &[f32], z: &[f32]) {
        let n = x.len();
        assert!(
            n <= self.bufs.max_particles,
            "particle count {n} exceeds GPU index capacity {}",
            self.bufs.max_particles
        );

        let total_cells = self.region.total_cells();

        // Refresh per-rebuild uniforms and inputs.
        let params = Self::make_params(&self.region, self.cutoff, n);
        self.queue
            .write_buffer(&self.bufs.params, 0, bytemuck::bytes_of(&params));
        let scan = GpuScanParams {
            n: n as u32,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        self.queue.write_buffer(
            &self.bufs.particles_scan_params,
            0,
            bytemuck::bytes_of(&scan),
        );
        self.bufs.upload_positions(&self.queue, x, y, z);
        self.bufs.clear_counts(&self.queue);

        // Passes 1-5, then read the total to size the flat list.
        self.submit_sizing(n);
        let nbor_offsets = read_u32(&self.device, &self.queue, &self.bufs.nbor_offsets, n + 1);
        let total = *nbor_offsets.last().unwrap_or(&0) as usize;

        self.bufs.ensure_nbor_capacity(&self.device, total);
        self.submit_fill(n);

        // Host-side copies for consumers.
        let cells = read_u32(&self.device, &self.queue, &self.bufs.cell_ids, n);
        let counts = read_u32(&self.device, &self.queue, &self.bufs.cell_counts, total_cells);
        let offsets = read_u32(
            &self.device,
            &self.queue,
            &self.bufs.cell_offsets,
            total_cells + 1,
        );
        let permutation = read_u32(&self.device, &self.queue, &self.bufs.permutation, n);
        let indices = read_u32(&self.device, &self.queue, &self.bufs.nbor_list, total);

        self.cell_list = CellList {
            cells,
            counts,
            offsets,
            permutation,
        };
        self.neighbor_list = NeighborList {
            offsets: nbor_offsets,
            indices,
        };
    }

    fn cell_list(&self) -> &CellList {
        &self.cell_list
    }

    fn neighbor_list(&self) -> &NeighborList {
        &self.neighbor_list
    }
}
