//! Bound resources and bind group construction.
//!
//! Every resource a kernel touches is described by a [`Binding`] borrowed from
//! the chunk that owns it. One bind group holds one resource, so a dispatch
//! composes its inputs and outputs by picking groups rather than rebuilding
//! descriptor tables.

use wgpu::{BindGroup, BindGroupLayout, Device, ShaderStages, TextureFormat};

/// A device resource as a kernel sees it.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    Buffer {
        buffer: &'a wgpu::Buffer,
        /// Element size in bytes.
        stride: u64,
        size: u64,
    },
    Image {
        texture: &'a wgpu::Texture,
        view: &'a wgpu::TextureView,
        format: TextureFormat,
    },
}

/// Structural shape of a binding; groups with the same shape share a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingShape {
    StorageBuffer,
    StorageImage(TextureFormat),
}

impl BindingShape {
    fn layout_entries(&self, visibility: ShaderStages) -> Vec<wgpu::BindGroupLayoutEntry> {
        match self {
            BindingShape::StorageBuffer => vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            BindingShape::StorageImage(format) => vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: *format,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
        }
    }
}

impl<'a> Binding<'a> {
    pub fn shape(&self) -> BindingShape {
        match self {
            Binding::Buffer { .. } => BindingShape::StorageBuffer,
            Binding::Image { format, .. } => BindingShape::StorageImage(*format),
        }
    }

    fn entries(&self) -> Vec<wgpu::BindGroupEntry<'a>> {
        match *self {
            Binding::Buffer { buffer, .. } => vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            Binding::Image { view, .. } => vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        }
    }
}

/// Errors raised while building bind groups.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("binding `{label}` has shape {found:?} but its layout expects {expected:?}")]
    ShapeMismatch {
        label: String,
        expected: BindingShape,
        found: BindingShape,
    },
}

/// Bind group layout inferred from the first group built through it.
///
/// Later groups must have the same shape and reuse the cached layout.
pub struct LayoutCache {
    label: &'static str,
    visibility: ShaderStages,
    cached: Option<(BindingShape, BindGroupLayout)>,
}

impl LayoutCache {
    pub fn new(label: &'static str, visibility: ShaderStages) -> Self {
        Self {
            label,
            visibility,
            cached: None,
        }
    }

    pub fn layout(&self) -> Option<&BindGroupLayout> {
        self.cached.as_ref().map(|(_, layout)| layout)
    }

    pub fn shape(&self) -> Option<BindingShape> {
        self.cached.as_ref().map(|(shape, _)| *shape)
    }

    /// Build a single-resource bind group, creating the layout on first use.
    pub fn group(
        &mut self,
        device: &Device,
        label: &str,
        binding: &Binding<'_>,
    ) -> Result<BindGroup, BindingError> {
        let shape = binding.shape();
        if let Some((expected, _)) = &self.cached {
            if *expected != shape {
                return Err(BindingError::ShapeMismatch {
                    label: label.to_string(),
                    expected: *expected,
                    found: shape,
                });
            }
        }

        let cache_label = self.label;
        let visibility = self.visibility;
        let (_, layout) = self.cached.get_or_insert_with(|| {
            log::debug!("Inferring {} layout from `{}`", cache_label, label);
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(cache_label),
                entries: &shape.layout_entries(visibility),
            });
            (shape, layout)
        });

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &binding.entries(),
        }))
    }
}

/// Layout of the dynamic-offset uniform window shared by every kernel.
pub fn params_layout(device: &Device, block_size: u64) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("params_layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: std::num::NonZeroU64::new(block_size),
            },
            count: None,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_entries() {
        let visibility = ShaderStages::COMPUTE;
        assert_eq!(BindingShape::StorageBuffer.layout_entries(visibility).len(), 1);
        let entries =
            BindingShape::StorageImage(TextureFormat::Rgba8Unorm).layout_entries(visibility);
        assert!(matches!(
            entries[0].ty,
            wgpu::BindingType::StorageTexture { .. }
        ));
    }

    #[test]
    fn test_cache_starts_empty() {
        let cache = LayoutCache::new("storage_layout", ShaderStages::COMPUTE);
        assert!(cache.layout().is_none());
        assert!(cache.shape().is_none());
    }
}
