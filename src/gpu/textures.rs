//! Persistent spectrogram images.

use wgpu::{Device, Queue, Texture, TextureFormat, TextureUsages, TextureView};

use super::binding::Binding;

pub const IMAGE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Which of the two persistent images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Spectrogram of the unfiltered signal.
    Raw,
    /// Spectrogram of the filtered signal.
    Filtered,
}

/// A storage image that owns both texture and view.
/// The texture must outlive its view, so we keep them together.
pub struct StorageImage {
    view: TextureView,
    texture: Texture,
    width: u32,
    height: u32,
}

impl StorageImage {
    pub fn new(device: &Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: TextureUsages::STORAGE_BINDING
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            view,
            texture,
            width,
            height,
        }
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn binding(&self) -> Binding<'_> {
        Binding::Image {
            texture: &self.texture,
            view: &self.view,
            format: IMAGE_FORMAT,
        }
    }

    /// Upload a `width x height` block of RGBA pixels starting at column `x`.
    pub fn write_rgba(&self, queue: &Queue, x: u32, width: u32, height: u32, rgba: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y: 0, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy(self) {
        drop(self.view);
        self.texture.destroy();
    }
}

/// The raw and filtered spectrogram images of a device context.
pub struct SpectrogramImages {
    raw: StorageImage,
    filtered: StorageImage,
}

impl SpectrogramImages {
    pub fn new(device: &Device, width: u32, height: u32) -> Self {
        Self {
            raw: StorageImage::new(device, "spectrogram_raw", width, height),
            filtered: StorageImage::new(device, "spectrogram_filtered", width, height),
        }
    }

    pub fn get(&self, kind: ImageKind) -> &StorageImage {
        match kind {
            ImageKind::Raw => &self.raw,
            ImageKind::Filtered => &self.filtered,
        }
    }

    pub fn destroy(self) {
        self.filtered.destroy();
        self.raw.destroy();
    }
}
