//! Uniform parameter blocks for the kernels.
//!
//! These structs must match the WGSL shader definitions exactly,
//! including alignment requirements. Every block fits in [`PARAM_BLOCK_SIZE`]
//! bytes so a single dynamic-offset binding serves all kernels.

use std::num::NonZeroU64;

use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, BufferUsages, Device};

/// Size of the uniform binding window each dispatch sees.
pub const PARAM_BLOCK_SIZE: u64 = 32;

/// One butterfly stage of the sliding DFT.
/// WGSL: struct SdftParams { 8 x u32 }, 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SdftParams {
    /// Butterfly span; zero marks the single-bin copy pass.
    pub stage_stride: u32,
    /// Distance in elements between the starts of consecutive source columns.
    pub hop: u32,
    /// Final stage: write in natural bin order into the destination.
    pub is_write_img: u32,
    pub is_inverse: u32,
    /// Rotate bins by half the height on the final write.
    pub is_shift: u32,
    pub spec_height: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl SdftParams {
    pub fn stage(stage_stride: u32, hop: u32, spec_height: u32) -> Self {
        Self {
            stage_stride,
            hop,
            is_write_img: 0,
            is_inverse: 0,
            is_shift: 0,
            spec_height,
            _pad0: 0,
            _pad1: 0,
        }
    }

    pub fn with_flags(mut self, write_img: bool, inverse: bool, shift: bool) -> Self {
        self.is_write_img = write_img as u32;
        self.is_inverse = inverse as u32;
        self.is_shift = shift as u32;
        self
    }
}

/// Host mask to device mask bilinear resample.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ResizeParams {
    pub src_rows: u32,
    pub src_cols: u32,
    pub dst_rows: u32,
    pub dst_cols: u32,
}

/// Tap-group multiply of the filter bank against the extended signal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterParams {
    pub signal_len: u32,
    pub hop: u32,
    pub spec_height: u32,
    pub _pad: u32,
}

impl FilterParams {
    pub fn new(signal_len: u32, hop: u32, spec_height: u32) -> Self {
        Self {
            signal_len,
            hop,
            spec_height,
            _pad: 0,
        }
    }
}

/// One halving level of the partial-sum reduction.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SumParams {
    /// Distance to the paired partial; zero copies a single partial through.
    pub stride: u32,
    /// Row pitch of the destination.
    pub out_stride: u32,
    /// Row pitch of the source (the number of tap groups).
    pub spec_height: u32,
    pub signal_len: u32,
}

/// Parameter blocks for every recorded dispatch of a chunk.
///
/// Blocks are written once at setup and addressed by dynamic offset, which
/// must be a multiple of the device's `min_uniform_buffer_offset_alignment`.
#[derive(Debug)]
pub struct ParamArena {
    alignment: u64,
    bytes: Vec<u8>,
}

impl ParamArena {
    pub fn new(min_uniform_alignment: u32) -> Self {
        Self {
            alignment: u64::from(min_uniform_alignment).max(PARAM_BLOCK_SIZE),
            bytes: Vec::new(),
        }
    }

    /// Append a block and return its dynamic offset.
    pub fn push<P: bytemuck::Pod>(&mut self, params: &P) -> u32 {
        let offset = self.bytes.len();
        let block = bytemuck::bytes_of(params);
        debug_assert!(block.len() as u64 <= PARAM_BLOCK_SIZE);
        self.bytes.extend_from_slice(block);
        self.bytes.resize(offset + self.alignment as usize, 0);
        offset as u32
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.alignment as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Upload the arena and bind it with a [`PARAM_BLOCK_SIZE`] window.
    pub fn upload(&self, device: &Device, layout: &BindGroupLayout) -> ParamBuffer {
        // An empty arena still needs one block for the binding window.
        let mut contents = self.bytes.clone();
        contents.resize(contents.len().max(PARAM_BLOCK_SIZE as usize), 0);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("chunk_params"),
            contents: &contents,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("chunk_params_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(PARAM_BLOCK_SIZE),
                }),
            }],
        });
        ParamBuffer { bind_group, buffer }
    }
}

/// Uploaded parameter arena. The bind group is released before the buffer.
pub struct ParamBuffer {
    pub bind_group: BindGroup,
    pub buffer: Buffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_sizes() {
        assert_eq!(std::mem::size_of::<SdftParams>(), 32);
        assert_eq!(std::mem::size_of::<ResizeParams>(), 16);
        assert_eq!(std::mem::size_of::<FilterParams>(), 16);
        assert_eq!(std::mem::size_of::<SumParams>(), 16);
    }

    #[test]
    fn test_arena_offsets_follow_alignment() {
        let mut arena = ParamArena::new(256);
        let first = arena.push(&SdftParams::stage(4, 128, 8));
        let second = arena.push(&FilterParams::new(10, 2, 8));
        assert_eq!(first, 0);
        assert_eq!(second, 256);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.as_bytes().len(), 512);
    }

    #[test]
    fn test_arena_alignment_never_below_block() {
        let arena = ParamArena::new(4);
        assert_eq!(arena.alignment(), PARAM_BLOCK_SIZE);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_sdft_flags() {
        let params = SdftParams::stage(1, 16, 16).with_flags(true, false, true);
        assert_eq!(params.is_write_img, 1);
        assert_eq!(params.is_inverse, 0);
        assert_eq!(params.is_shift, 1);
    }
}
