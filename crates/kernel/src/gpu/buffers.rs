//! GPU buffer management for the spatial index.
//!
//! Creates and manages wgpu storage buffers for particle positions, cell-list
//! arrays, and neighbor-list arrays. Handles CPU->GPU upload and GPU->CPU
//! readback.

use wgpu::util::DeviceExt;

/// Index parameters uniform buffer layout.
/// Must match the IndexParams struct in all WGSL shaders exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuIndexParams {
    pub n_particles: u32,
    pub dim_x: u32,
    pub dim_y: u32,
    pub dim_z: u32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub origin_z: f32,
    pub cutoff_sq: f32,
    pub inv_cell_x: f32,
    pub inv_cell_y: f32,
    pub inv_cell_z: f32,
    pub _pad0: f32,
    pub lo_x: i32,
    pub lo_y: i32,
    pub lo_z: i32,
    pub _pad1: i32,
}

/// Prefix-sum parameters uniform buffer layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuScanParams {
    pub n: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

/// All GPU buffers needed for one sub-domain's spatial index.
pub struct GpuIndexBuffers {
    // Uniform buffers
    pub params: wgpu::Buffer,
    pub cells_scan_params: wgpu::Buffer,
    pub particles_scan_params: wgpu::Buffer,

    // Particle positions
    pub pos_x: wgpu::Buffer,
    pub pos_y: wgpu::Buffer,
    pub pos_z: wgpu::Buffer,

    // Cell-list arrays
    pub cell_ids: wgpu::Buffer,
    pub cell_counts: wgpu::Buffer,
    pub cell_offsets: wgpu::Buffer,
    pub cursors: wgpu::Buffer,
    pub permutation: wgpu::Buffer,

    // Neighbor-list arrays
    pub nbor_counts: wgpu::Buffer,
    pub nbor_offsets: wgpu::Buffer,
    pub nbor_list: wgpu::Buffer,
    /// Current element capacity of `nbor_list`.
    pub nbor_capacity: usize,

    pub max_particles: usize,
    pub total_cells: usize,
}

const STORAGE_RW: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

fn storage_buffer(device: &wgpu::Device, label: &str, elements: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (elements.max(1) * 4) as u64,
        usage: STORAGE_RW,
        mapped_at_creation: false,
    })
}

impl GpuIndexBuffers {
    /// Allocate all buffers for up to `max_particles` particles over a grid
    /// of `total_cells` cells.
    pub fn new(
        device: &wgpu::Device,
        params: &GpuIndexParams,
        max_particles: usize,
        total_cells: usize,
    ) -> Self {
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("index_params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let cells_scan = GpuScanParams {
            n: total_cells as u32,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        let cells_scan_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cells_scan_params"),
            contents: bytemuck::bytes_of(&cells_scan),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let particles_scan = GpuScanParams {
            n: 0,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        let particles_scan_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particles_scan_params"),
            contents: bytemuck::bytes_of(&particles_scan),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            params: params_buf,
            cells_scan_params,
            particles_scan_params,
            pos_x: storage_buffer(device, "pos_x", max_particles),
            pos_y: storage_buffer(device, "pos_y", max_particles),
            pos_z: storage_buffer(device, "pos_z", max_particles),
            cell_ids: storage_buffer(device, "cell_ids", max_particles),
            cell_counts: storage_buffer(device, "cell_counts", total_cells),
            cell_offsets: storage_buffer(device, "cell_offsets", total_cells + 1),
            cursors: storage_buffer(device, "cursors", total_cells),
            permutation: storage_buffer(device, "permutation", max_particles),
            nbor_counts: storage_buffer(device, "nbor_counts", max_particles),
            nbor_offsets: storage_buffer(device, "nbor_offsets", max_particles + 1),
            nbor_list: storage_buffer(device, "nbor_list", max_particles),
            nbor_capacity: max_particles,
            max_particles,
            total_cells,
        }
    }

    /// Upload current particle positions.
    pub fn upload_positions(&self, queue: &wgpu::Queue, x: &[f32], y: &[f32], z: &[f32]) {
        queue.write_buffer(&self.pos_x, 0, bytemuck::cast_slice(x));
        queue.write_buffer(&self.pos_y, 0, bytemuck::cast_slice(y));
        queue.write_buffer(&self.pos_z, 0, bytemuck::cast_slice(z));
    }

    /// Zero the per-cell count and cursor arrays before a rebuild.
    pub fn clear_counts(&self, queue: &wgpu::Queue) {
        let zeros = vec![0u8; self.total_cells.max(1) * 4];
        queue.write_buffer(&self.cell_counts, 0, &zeros);
        queue.write_buffer(&self.cursors, 0, &zeros);
    }

    /// Grow the flat neighbor array if `total` exceeds its capacity.
    pub fn ensure_nbor_capacity(&mut self, device: &wgpu::Device, total: usize) {
        if total > self.nbor_capacity {
            let capacity = total.next_power_of_two();
            self.nbor_list = storage_buffer(device, "nbor_list", capacity);
            self.nbor_capacity = capacity;
        }
    }
}

/// Read `count` u32 elements back from a storage buffer.
///
/// Copies through a transient staging buffer and blocks until the map
/// completes. A failed map is fatal: there is no meaningful recovery from a
/// lost device mid-step.
pub fn read_u32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Buffer,
    count: usize,
) -> Vec<u32> {
    if count == 0 {
        return Vec::new();
    }
    let size = (count * 4) as u64;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback"),
    });
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .expect("map_async callback dropped")
        .expect("buffer map failed");

    let data = slice.get_mapped_range();
    let out: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    out
}
