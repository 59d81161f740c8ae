//! Device buffers owned by a chunk.

use wgpu::{Buffer, BufferUsages, Device};

use super::ComputeError;
use crate::gpu::binding::Binding;

/// Bytes per complex element (`vec2<f32>`).
pub const COMPLEX_SIZE: u64 = 8;
/// Bytes per packed host mask pixel.
pub const PIXEL_SIZE: u64 = 4;
/// Taps summed by one multiply invocation.
pub const TAPS_PER_GROUP: u32 = 32;
/// Threads along x in the transform and resize kernels.
pub const TRANSFORM_WORKGROUP: u32 = 256;
/// Rows (signal positions) per workgroup in the multiply and sum kernels.
pub const ROWS_PER_WORKGROUP: u32 = 32;

/// Every buffer a chunk owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    SdftScratch0,
    SdftScratch1,
    SignalRaw,
    SignalExt,
    SignalFilt,
    FilterScratch0,
    FilterScratch1,
    SpecRaw,
    SpecFilt,
    Mask,
    Filters,
    Synthesis,
    MaskHost,
    Upload,
    SignalReadback,
    SpectrumReadback,
}

impl BufferId {
    pub const ALL: [BufferId; 16] = [
        BufferId::SdftScratch0,
        BufferId::SdftScratch1,
        BufferId::SignalRaw,
        BufferId::SignalExt,
        BufferId::SignalFilt,
        BufferId::FilterScratch0,
        BufferId::FilterScratch1,
        BufferId::SpecRaw,
        BufferId::SpecFilt,
        BufferId::Mask,
        BufferId::Filters,
        BufferId::Synthesis,
        BufferId::MaskHost,
        BufferId::Upload,
        BufferId::SignalReadback,
        BufferId::SpectrumReadback,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BufferId::SdftScratch0 => "sdft_scratch_0",
            BufferId::SdftScratch1 => "sdft_scratch_1",
            BufferId::SignalRaw => "signal_raw",
            BufferId::SignalExt => "signal_ext",
            BufferId::SignalFilt => "signal_filt",
            BufferId::FilterScratch0 => "filter_scratch_0",
            BufferId::FilterScratch1 => "filter_scratch_1",
            BufferId::SpecRaw => "spec_raw",
            BufferId::SpecFilt => "spec_filt",
            BufferId::Mask => "mask",
            BufferId::Filters => "filters",
            BufferId::Synthesis => "synthesis",
            BufferId::MaskHost => "mask_host",
            BufferId::Upload => "upload_staging",
            BufferId::SignalReadback => "signal_readback",
            BufferId::SpectrumReadback => "spectrum_readback",
        }
    }

    pub fn usage(&self) -> BufferUsages {
        match self {
            BufferId::MaskHost => BufferUsages::STORAGE | BufferUsages::COPY_DST,
            BufferId::Upload => BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            BufferId::SignalReadback | BufferId::SpectrumReadback => {
                BufferUsages::MAP_READ | BufferUsages::COPY_DST
            }
            _ => BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        }
    }

    /// Whether the buffer is visible to kernels and gets a bind group.
    pub fn is_storage(&self) -> bool {
        self.usage().contains(BufferUsages::STORAGE)
    }

    pub fn stride(&self) -> u64 {
        match self {
            BufferId::MaskHost => PIXEL_SIZE,
            _ => COMPLEX_SIZE,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Geometry of a chunk and the element count of each of its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub spec_height: u32,
    pub segment_width: u32,
    pub hop: u32,
    pub host_mask_height: u32,
    pub host_mask_width: u32,
}

impl ChunkLayout {
    /// Samples covered by the processed signal: `H + hop * W`.
    pub fn signal_len(&self) -> u64 {
        u64::from(self.spec_height) + u64::from(self.hop) * u64::from(self.segment_width)
    }

    /// Signal plus the half-window of context on each side.
    pub fn extended_len(&self) -> u64 {
        self.signal_len() + u64::from(self.spec_height)
    }

    pub fn spectrum_len(&self) -> u64 {
        u64::from(self.spec_height) * u64::from(self.segment_width)
    }

    /// Tap groups per signal position, at least one.
    pub fn reduction_groups(&self) -> u32 {
        (self.spec_height / TAPS_PER_GROUP).max(1)
    }

    pub fn reduction_len(&self) -> u64 {
        self.signal_len() * u64::from(self.reduction_groups())
    }

    pub fn mask_host_len(&self) -> u64 {
        u64::from(self.host_mask_height) * u64::from(self.host_mask_width)
    }

    pub fn elements(&self, id: BufferId) -> u64 {
        match id {
            BufferId::SdftScratch0
            | BufferId::SdftScratch1
            | BufferId::SpecRaw
            | BufferId::SpecFilt
            | BufferId::Mask
            | BufferId::Filters
            | BufferId::Synthesis
            | BufferId::SpectrumReadback => self.spectrum_len(),
            BufferId::SignalRaw | BufferId::SignalFilt | BufferId::SignalReadback => {
                self.signal_len()
            }
            BufferId::SignalExt | BufferId::Upload => self.extended_len(),
            BufferId::FilterScratch0 | BufferId::FilterScratch1 => self.reduction_len(),
            BufferId::MaskHost => self.mask_host_len(),
        }
    }

    pub fn size_of(&self, id: BufferId) -> u64 {
        self.elements(id) * id.stride()
    }

    /// Workgroups along x for the transform and resize kernels.
    pub fn transform_groups(&self) -> u32 {
        (self.spec_height / (TRANSFORM_WORKGROUP * 4)).max(1)
    }

    /// Workgroups along y for the multiply and sum kernels.
    pub fn row_groups(&self) -> u64 {
        self.signal_len().div_ceil(u64::from(ROWS_PER_WORKGROUP))
    }

    /// Reject geometries the device cannot hold or dispatch.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> Result<(), ComputeError> {
        let max_buffer = u64::from(limits.max_buffer_size);
        let max_storage = u64::from(limits.max_storage_buffer_binding_size);
        for id in BufferId::ALL {
            let size = self.size_of(id);
            if size > max_buffer {
                return Err(ComputeError::Limit {
                    what: id.label(),
                    requested: size,
                    limit: max_buffer,
                });
            }
            if id.is_storage() && size > max_storage {
                return Err(ComputeError::Limit {
                    what: id.label(),
                    requested: size,
                    limit: max_storage,
                });
            }
        }

        let max_groups = u64::from(limits.max_compute_workgroups_per_dimension);
        let dispatches = [
            ("segment columns", u64::from(self.segment_width)),
            ("signal rows", self.row_groups()),
            ("transform groups", u64::from(self.transform_groups())),
            ("tap groups", u64::from(self.reduction_groups())),
        ];
        for (what, requested) in dispatches {
            if requested > max_groups {
                return Err(ComputeError::Limit {
                    what,
                    requested,
                    limit: max_groups,
                });
            }
        }

        let bind_groups = u64::from(limits.max_bind_groups);
        if bind_groups < 4 {
            return Err(ComputeError::Limit {
                what: "bind groups",
                requested: 4,
                limit: bind_groups,
            });
        }
        Ok(())
    }
}

/// A device buffer together with the record of how it was allocated.
pub struct OwnedBuffer {
    pub id: BufferId,
    pub buffer: Buffer,
    pub size: u64,
}

impl OwnedBuffer {
    pub fn binding(&self) -> Binding<'_> {
        Binding::Buffer {
            buffer: &self.buffer,
            stride: self.id.stride(),
            size: self.size,
        }
    }

    /// Map the first `count` complex elements and copy them out.
    pub fn read_complex(&self, device: &Device, count: u64) -> Result<Vec<[f32; 2]>, ComputeError> {
        let size = count * COMPLEX_SIZE;
        let slice = self.buffer.slice(..size);

        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ComputeError::BufferMapFailed(e.to_string()))?;

        rx.recv()
            .map_err(|e| ComputeError::BufferMapFailed(e.to_string()))?
            .map_err(|e| ComputeError::BufferMapFailed(format!("{:?}", e)))?;

        let data = slice.get_mapped_range();
        let result: Vec<[f32; 2]> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        self.buffer.unmap();

        Ok(result)
    }
}

/// All buffers of a chunk, indexed by [`BufferId`].
pub struct ChunkBuffers {
    buffers: Vec<OwnedBuffer>,
}

impl ChunkBuffers {
    /// Allocate every buffer. The layout must already have passed [`ChunkLayout::check_limits`].
    pub fn allocate(device: &Device, layout: &ChunkLayout) -> Self {
        let buffers = BufferId::ALL
            .iter()
            .map(|&id| {
                let size = layout.size_of(id);
                log::debug!("Allocating {} ({} bytes)", id.label(), size);
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(id.label()),
                    size,
                    usage: id.usage(),
                    mapped_at_creation: false,
                });
                OwnedBuffer { id, buffer, size }
            })
            .collect();
        Self { buffers }
    }

    pub fn get(&self, id: BufferId) -> &OwnedBuffer {
        &self.buffers[id.index()]
    }

    pub fn buffer(&self, id: BufferId) -> &Buffer {
        &self.get(id).buffer
    }

    pub fn storage(&self) -> impl Iterator<Item = &OwnedBuffer> {
        self.buffers.iter().filter(|b| b.id.is_storage())
    }

    /// Release device memory now rather than when the handles drop.
    pub fn destroy(self) {
        for owned in self.buffers {
            owned.buffer.destroy();
        }
    }
}
