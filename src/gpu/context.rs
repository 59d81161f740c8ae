//! GPU context initialization and management.
//!
//! The context owns the instance, the chosen adapter and device, the queue
//! role assignment and the two persistent spectrogram images. It is created
//! once and shared by every engine built on it.

use std::collections::HashSet;
use std::sync::Arc;

use wgpu::{Adapter, Device, Instance, Queue};

use super::binding::{BindingError, LayoutCache};
use super::queues::{self, QueueFamily, QueueRole, QueueRoles};
use super::textures::{ImageKind, SpectrogramImages, StorageImage};
use crate::spectrogram::Spectrogram;

/// Errors that can occur during GPU operations.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("No adapter exposes a compute-capable queue family")]
    NoComputeQueue,
    #[error("Failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("Image write of {width} columns at {offset} exceeds image width {image_width}")]
    ImageBounds {
        offset: u32,
        width: u32,
        image_width: u32,
    },
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Options for context creation.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Features the device must enable.
    pub features: wgpu::Features,
    /// Adapter requests in order of preference.
    pub power_preferences: Vec<wgpu::PowerPreference>,
    /// Also consider the software fallback adapter.
    pub allow_fallback: bool,
    /// Extent of each persistent spectrogram image, clamped to the device limit.
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            features: wgpu::Features::empty(),
            power_preferences: vec![
                wgpu::PowerPreference::HighPerformance,
                wgpu::PowerPreference::LowPower,
            ],
            allow_fallback: true,
            image_width: 8192,
            image_height: 1024,
        }
    }
}

/// GPU context holding device, queue roles and persistent images.
///
/// Fields are declared in release order: images, then queue and device,
/// then adapter and instance.
pub struct DeviceContext {
    images: SpectrogramImages,
    pub queue: Arc<Queue>,
    pub device: Arc<Device>,
    pub adapter: Arc<Adapter>,
    pub instance: Instance,
    roles: QueueRoles,
    families: Vec<QueueFamily>,
}

impl DeviceContext {
    /// Create a context on the adapter with the most compute-capable queue families.
    pub async fn new(options: &ContextOptions) -> Result<Self, GpuError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::GL,
            flags: wgpu::InstanceFlags::from_build_config(),
            ..Default::default()
        });

        let candidates = Self::candidate_adapters(&instance, options).await;
        if candidates.is_empty() {
            return Err(GpuError::NoAdapter);
        }

        let families: Vec<Vec<QueueFamily>> = candidates
            .iter()
            .map(|adapter| {
                let compute = adapter
                    .get_downlevel_capabilities()
                    .flags
                    .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
                vec![QueueFamily::universal(compute)]
            })
            .collect();

        let selected = queues::select_device(
            families
                .iter()
                .map(|f| queues::count_compute_families(f)),
        )
        .ok_or(GpuError::NoComputeQueue)?;

        let adapter = candidates
            .into_iter()
            .nth(selected)
            .ok_or(GpuError::NoAdapter)?;
        let families = families.into_iter().nth(selected).unwrap_or_default();
        let roles = queues::assign_queue_roles(&families).ok_or(GpuError::NoComputeQueue)?;

        let info = adapter.get_info();
        log::info!(
            "Using adapter {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );
        log::debug!("Queue roles: {:?}", roles);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sdft-filter"),
                required_features: options.features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        let max_extent = device.limits().max_texture_dimension_2d;
        let width = options.image_width.clamp(1, max_extent);
        let height = options.image_height.clamp(1, max_extent);
        let images = SpectrogramImages::new(&device, width, height);

        Ok(Self {
            images,
            queue: Arc::new(queue),
            device: Arc::new(device),
            adapter: Arc::new(adapter),
            instance,
            roles,
            families,
        })
    }

    /// Blocking variant of [`DeviceContext::new`].
    pub fn blocking(options: &ContextOptions) -> Result<Self, GpuError> {
        pollster::block_on(Self::new(options))
    }

    async fn candidate_adapters(instance: &Instance, options: &ContextOptions) -> Vec<Adapter> {
        let mut requests: Vec<(wgpu::PowerPreference, bool)> = options
            .power_preferences
            .iter()
            .map(|&preference| (preference, false))
            .collect();
        if options.allow_fallback {
            requests.push((wgpu::PowerPreference::None, true));
        }

        let mut seen = HashSet::new();
        let mut adapters = Vec::new();
        for (power_preference, force_fallback_adapter) in requests {
            let Ok(adapter) = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference,
                    force_fallback_adapter,
                    compatible_surface: None,
                })
                .await
            else {
                continue;
            };
            let info = adapter.get_info();
            if seen.insert((info.name.clone(), info.vendor, info.device, info.backend)) {
                log::debug!("Adapter candidate: {} ({:?})", info.name, info.backend);
                adapters.push(adapter);
            }
        }
        adapters
    }

    /// Get info about the GPU adapter.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn roles(&self) -> QueueRoles {
        self.roles
    }

    pub fn queue_families(&self) -> &[QueueFamily] {
        &self.families
    }

    /// Queue backing a logical role. wgpu exposes one queue, so every role shares it.
    pub fn queue_for(&self, role: QueueRole) -> &Arc<Queue> {
        log::trace!(
            "{} work on family {}",
            role.name(),
            self.roles.family(role)
        );
        &self.queue
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn image(&self, kind: ImageKind) -> &StorageImage {
        self.images.get(kind)
    }

    /// Bind group exposing a spectrogram image as a write-only storage image.
    pub fn image_bind_group(
        &self,
        kind: ImageKind,
        layouts: &mut LayoutCache,
    ) -> Result<wgpu::BindGroup, GpuError> {
        let image = self.images.get(kind);
        Ok(layouts.group(&self.device, "spectrogram_image", &image.binding())?)
    }

    /// Draw a spectrogram into one of the persistent images starting at column `x_offset`.
    ///
    /// Rows are resampled to the image height by nearest neighbour.
    pub fn write_spectrogram_image(
        &self,
        kind: ImageKind,
        spectrogram: &Spectrogram,
        x_offset: u32,
        floor_db: f32,
    ) -> Result<(), GpuError> {
        let image = self.images.get(kind);
        let width = spectrogram.width() as u32;
        if width == 0 || x_offset.saturating_add(width) > image.width() {
            return Err(GpuError::ImageBounds {
                offset: x_offset,
                width,
                image_width: image.width(),
            });
        }

        let gray = spectrogram.to_gray_pixels(floor_db);
        let rows = spectrogram.height();
        let height = image.height() as usize;
        let mut rgba = Vec::with_capacity(height * width as usize * 4);
        for y in 0..height {
            let row = y * rows / height;
            for &g in &gray[row * width as usize..(row + 1) * width as usize] {
                rgba.extend_from_slice(&[g, g, g, 255]);
            }
        }

        image.write_rgba(&self.queue, x_offset, width, image.height(), &rgba);
        Ok(())
    }

    /// Release the images, then the device.
    pub fn destroy(self) {
        log::debug!("Destroying device context");
        self.images.destroy();
        self.device.destroy();
    }
}
