//! One processing segment: every device resource a filter run touches.
//!
//! A chunk is allocated in two steps. [`Chunk::allocate`] creates the buffers
//! and one bind group per storage buffer, which also fixes the shared storage
//! layout the kernels are compiled against. [`Chunk::record`] then writes all
//! parameter blocks and records the passes. Nothing is re-recorded afterwards.

use std::collections::HashMap;

use wgpu::{BindGroup, BindGroupLayout, Buffer, ComputePipeline, Device};

use super::binding::LayoutCache;
use super::compute::buffers::{BufferId, ChunkBuffers, ChunkLayout, OwnedBuffer};
use super::compute::params::ParamArena;
use super::compute::pass::{PassResources, RecordedPass};
use super::compute::pipelines::{Kernel, KernelCatalog};
use super::compute::sdft::{self, Direction, Transform};
use super::compute::{filter, ComputeError};
use super::sync::{Fence, Semaphore};

/// The recorded passes of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    /// Staging upload into the extended signal.
    UploadSdft,
    /// Forward transform of the extended signal into the raw spectrum.
    ForwardSdft,
    /// Raw spectrum into the spectrum readback.
    DownloadSdft,
    /// Host mask resample.
    MaskRead,
    /// Inverse transform of the mask into centred filters.
    MaskSdft,
    /// Multiply, reduce and forward transform of the filtered signal.
    Filter,
    /// Inverse transform of the raw spectrum into the synthesis buffer.
    Synthesis,
    /// Synthesis buffer into the spectrum readback.
    DownloadSynthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreId {
    Uploaded,
    Processed,
    MaskRead,
    FiltersReady,
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceId {
    Sdft,
    Filter,
}

pub struct ChunkPasses {
    passes: HashMap<PassId, RecordedPass>,
}

impl ChunkPasses {
    /// Record every pass of a chunk, collecting parameter blocks into `arena`.
    pub fn record(arena: &mut ParamArena, layout: &ChunkLayout, center_bins: bool) -> Self {
        let height = layout.spec_height;
        let mut passes = HashMap::new();

        let mut upload = RecordedPass::new("upload_sdft");
        upload.copy(
            BufferId::Upload,
            0,
            BufferId::SignalExt,
            layout.signal_len(),
        );
        upload.barrier(BufferId::SignalExt);
        passes.insert(PassId::UploadSdft, upload);

        let mut forward = RecordedPass::new("forward_sdft");
        sdft::record(
            &mut forward,
            arena,
            layout,
            &Transform {
                spec_height: height,
                input_hop: layout.hop,
                direction: Direction::Forward,
                shift: center_bins,
                input: BufferId::SignalExt,
                output: BufferId::SpecRaw,
            },
        );
        passes.insert(PassId::ForwardSdft, forward);

        let mut download = RecordedPass::new("download_sdft");
        download.copy(
            BufferId::SpecRaw,
            0,
            BufferId::SpectrumReadback,
            layout.spectrum_len(),
        );
        passes.insert(PassId::DownloadSdft, download);

        let mut mask_read = RecordedPass::new("mask_read");
        filter::record_mask_read(&mut mask_read, arena, layout);
        passes.insert(PassId::MaskRead, mask_read);

        let mut mask_sdft = RecordedPass::new("mask_sdft");
        sdft::record(
            &mut mask_sdft,
            arena,
            layout,
            &Transform {
                spec_height: height,
                input_hop: height,
                direction: Direction::Inverse,
                shift: true,
                input: BufferId::Mask,
                output: BufferId::Filters,
            },
        );
        passes.insert(PassId::MaskSdft, mask_sdft);

        let mut filter_pass = RecordedPass::new("filter");
        filter::record_convolution(&mut filter_pass, arena, layout);
        sdft::record(
            &mut filter_pass,
            arena,
            layout,
            &Transform {
                spec_height: height,
                input_hop: layout.hop,
                direction: Direction::Forward,
                shift: center_bins,
                input: BufferId::SignalFilt,
                output: BufferId::SpecFilt,
            },
        );
        passes.insert(PassId::Filter, filter_pass);

        let mut synthesis = RecordedPass::new("synthesis");
        sdft::record(
            &mut synthesis,
            arena,
            layout,
            &Transform {
                spec_height: height,
                input_hop: height,
                direction: Direction::Inverse,
                shift: false,
                input: BufferId::SpecRaw,
                output: BufferId::Synthesis,
            },
        );
        passes.insert(PassId::Synthesis, synthesis);

        let mut download_synthesis = RecordedPass::new("download_synthesis");
        download_synthesis.copy(
            BufferId::Synthesis,
            0,
            BufferId::SpectrumReadback,
            layout.spectrum_len(),
        );
        passes.insert(PassId::DownloadSynthesis, download_synthesis);

        Self { passes }
    }

    pub fn get(&self, id: PassId) -> Option<&RecordedPass> {
        self.passes.get(&id)
    }
}

/// Semaphores and fences of a chunk, indexed by their ids.
pub struct ChunkSync {
    semaphores: [Semaphore; 5],
    fences: [Fence; 2],
}

impl ChunkSync {
    pub fn new() -> Self {
        Self {
            semaphores: [
                Semaphore::new("uploaded_sdft"),
                Semaphore::new("processed_sdft"),
                Semaphore::new("mask_read"),
                Semaphore::new("filters_ready"),
                Semaphore::new("synthesized"),
            ],
            fences: [Fence::new("sdft"), Fence::new("filter")],
        }
    }

    pub fn semaphore(&mut self, id: SemaphoreId) -> &mut Semaphore {
        &mut self.semaphores[id as usize]
    }

    pub fn fence(&mut self, id: FenceId) -> &mut Fence {
        &mut self.fences[id as usize]
    }
}

impl Default for ChunkSync {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers and bind groups of a chunk before its passes are recorded.
pub struct ChunkResources {
    groups: HashMap<BufferId, BindGroup>,
    buffers: ChunkBuffers,
    layout: ChunkLayout,
}

/// A fully recorded processing segment.
///
/// Fields are declared in release order: bind groups, recorded passes,
/// sync objects, then device memory.
pub struct Chunk {
    groups: HashMap<BufferId, BindGroup>,
    params_group: BindGroup,
    passes: ChunkPasses,
    sync: ChunkSync,
    params_buffer: Buffer,
    buffers: ChunkBuffers,
    layout: ChunkLayout,
}

impl Chunk {
    /// Check the geometry against the device, allocate buffers and bind them.
    pub fn allocate(
        device: &Device,
        layout: ChunkLayout,
        layouts: &mut LayoutCache,
    ) -> Result<ChunkResources, ComputeError> {
        layout.check_limits(&device.limits())?;
        let buffers = ChunkBuffers::allocate(device, &layout);

        let mut groups = HashMap::new();
        for owned in buffers.storage() {
            let group = layouts.group(device, owned.id.label(), &owned.binding())?;
            groups.insert(owned.id, group);
        }

        Ok(ChunkResources {
            groups,
            buffers,
            layout,
        })
    }

    /// Record every pass and upload the parameter arena.
    pub fn record(
        device: &Device,
        resources: ChunkResources,
        params_layout: &BindGroupLayout,
        center_bins: bool,
    ) -> Self {
        let ChunkResources {
            groups,
            buffers,
            layout,
        } = resources;

        let mut arena = ParamArena::new(device.limits().min_uniform_buffer_offset_alignment);
        let passes = ChunkPasses::record(&mut arena, &layout, center_bins);
        let params = arena.upload(device, params_layout);
        log::debug!(
            "Recorded chunk: {} parameter blocks, {}x{} spectrogram",
            arena.len(),
            layout.spec_height,
            layout.segment_width
        );

        Self {
            groups,
            params_group: params.bind_group,
            passes,
            sync: ChunkSync::new(),
            params_buffer: params.buffer,
            buffers,
            layout,
        }
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn buffer(&self, id: BufferId) -> &OwnedBuffer {
        self.buffers.get(id)
    }

    pub fn pass(&self, id: PassId) -> Option<&RecordedPass> {
        self.passes.get(id)
    }

    pub fn sync(&mut self) -> &mut ChunkSync {
        &mut self.sync
    }

    /// Resolve pass ids against this chunk and a kernel catalog.
    pub fn bind<'a>(&'a self, catalog: &'a KernelCatalog) -> BoundChunk<'a> {
        BoundChunk {
            chunk: self,
            catalog,
        }
    }

    /// Release the chunk: bind groups, passes and sync objects, then memory.
    pub fn destroy(self) {
        log::debug!("Destroying chunk");
        let Chunk {
            groups,
            params_group,
            passes,
            sync,
            params_buffer,
            buffers,
            ..
        } = self;
        drop(groups);
        drop(params_group);
        drop(passes);
        drop(sync);
        params_buffer.destroy();
        buffers.destroy();
    }
}

/// A chunk paired with the pipelines its passes dispatch.
pub struct BoundChunk<'a> {
    chunk: &'a Chunk,
    catalog: &'a KernelCatalog,
}

impl PassResources for BoundChunk<'_> {
    fn buffer(&self, id: BufferId) -> &Buffer {
        self.chunk.buffers.buffer(id)
    }

    fn group(&self, id: BufferId) -> Option<&BindGroup> {
        self.chunk.groups.get(&id)
    }

    fn params(&self) -> &BindGroup {
        &self.chunk.params_group
    }

    fn pipeline(&self, kernel: Kernel) -> &ComputePipeline {
        self.catalog.pipeline(kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::compute::pass::Step;

    fn layout() -> ChunkLayout {
        ChunkLayout {
            spec_height: 64,
            segment_width: 8,
            hop: 16,
            host_mask_height: 32,
            host_mask_width: 4,
        }
    }

    #[test]
    fn test_every_pass_recorded() {
        let mut arena = ParamArena::new(256);
        let passes = ChunkPasses::record(&mut arena, &layout(), true);
        for id in [
            PassId::UploadSdft,
            PassId::ForwardSdft,
            PassId::DownloadSdft,
            PassId::MaskRead,
            PassId::MaskSdft,
            PassId::Filter,
            PassId::Synthesis,
            PassId::DownloadSynthesis,
        ] {
            assert!(passes.get(id).is_some(), "{id:?} missing");
        }
        // 6 stages each for four transforms, a resize, a multiply and one sum.
        assert_eq!(arena.len(), 6 * 4 + 3);
    }

    #[test]
    fn test_mask_transform_is_inverse_and_centred() {
        let mut arena = ParamArena::new(256);
        let passes = ChunkPasses::record(&mut arena, &layout(), false);
        let mask_sdft = passes.get(PassId::MaskSdft).unwrap();
        let last = mask_sdft.dispatches().last().unwrap();
        assert_eq!(last.groups[1], BufferId::Filters);

        let offsets: Vec<usize> = mask_sdft
            .dispatches()
            .map(|d| d.params_offset as usize)
            .collect();
        let block = |offset: usize| -> crate::gpu::compute::params::SdftParams {
            bytemuck::pod_read_unaligned(&arena.as_bytes()[offset..offset + 32])
        };
        assert_eq!(block(offsets[0]).is_inverse, 1);
        assert_eq!(block(*offsets.last().unwrap()).is_shift, 1);
    }

    #[test]
    fn test_filter_pass_ends_with_filtered_spectrum() {
        let mut arena = ParamArena::new(256);
        let passes = ChunkPasses::record(&mut arena, &layout(), true);
        let filter = passes.get(PassId::Filter).unwrap();
        assert_eq!(
            filter.steps().last(),
            Some(&Step::Barrier(BufferId::SpecFilt))
        );
    }

    #[test]
    fn test_sync_objects_start_clear() {
        let mut sync = ChunkSync::new();
        assert!(!sync.semaphore(SemaphoreId::Uploaded).is_signaled());
        assert_eq!(sync.semaphore(SemaphoreId::Synthesized).label(), "synthesized");
        assert_eq!(sync.fence(FenceId::Filter).label(), "filter");
    }
}
