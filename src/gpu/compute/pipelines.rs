//! Compute pipeline creation for the filter kernels.

use std::borrow::Cow;
use std::path::PathBuf;

use wgpu::{BindGroupLayout, ComputePipeline, Device};

use super::ComputeError;

/// The four kernels the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// One radix-2 butterfly stage of the sliding DFT.
    Sdft,
    /// Host mask to spectrogram-resolution mask.
    Resize,
    /// Tap-group multiply of filters against the extended signal.
    Filter,
    /// One halving level of the partial-sum reduction.
    Sum,
}

impl Kernel {
    pub const ALL: [Kernel; 4] = [Kernel::Sdft, Kernel::Resize, Kernel::Filter, Kernel::Sum];

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Sdft => "sdft",
            Kernel::Resize => "resize",
            Kernel::Filter => "filter",
            Kernel::Sum => "sum",
        }
    }

    /// Storage bind groups ahead of the parameter group.
    pub fn storage_groups(&self) -> usize {
        match self {
            Kernel::Filter => 3,
            _ => 2,
        }
    }

    fn embedded_source(&self) -> &'static str {
        match self {
            Kernel::Sdft => include_str!("../shaders/sdft.wgsl"),
            Kernel::Resize => include_str!("../shaders/resize.wgsl"),
            Kernel::Filter => include_str!("../shaders/filter.wgsl"),
            Kernel::Sum => include_str!("../shaders/sum.wgsl"),
        }
    }
}

/// Where kernel sources are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KernelSource {
    /// Sources compiled into the library.
    #[default]
    Embedded,
    /// `<dir>/<kernel>.wgsl` files read at initialisation.
    Directory(PathBuf),
}

impl KernelSource {
    pub fn load(&self, kernel: Kernel) -> Result<Cow<'static, str>, ComputeError> {
        match self {
            KernelSource::Embedded => Ok(Cow::Borrowed(kernel.embedded_source())),
            KernelSource::Directory(dir) => {
                let path = dir.join(format!("{}.wgsl", kernel.name()));
                std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|source| ComputeError::ShaderLoad {
                        kernel: kernel.name(),
                        path,
                        source,
                    })
            }
        }
    }
}

/// All compute pipelines, created once per engine.
pub struct KernelCatalog {
    sdft: ComputePipeline,
    resize: ComputePipeline,
    filter: ComputePipeline,
    sum: ComputePipeline,
}

impl KernelCatalog {
    /// Load and compile every kernel against the shared layouts.
    pub fn new(
        device: &Device,
        storage_layout: &BindGroupLayout,
        params_layout: &BindGroupLayout,
        source: &KernelSource,
    ) -> Result<Self, ComputeError> {
        let create = |kernel: Kernel| -> Result<ComputePipeline, ComputeError> {
            let code = source.load(kernel)?;
            Self::create_pipeline(device, kernel, &code, storage_layout, params_layout)
        };

        Ok(Self {
            sdft: create(Kernel::Sdft)?,
            resize: create(Kernel::Resize)?,
            filter: create(Kernel::Filter)?,
            sum: create(Kernel::Sum)?,
        })
    }

    pub fn pipeline(&self, kernel: Kernel) -> &ComputePipeline {
        match kernel {
            Kernel::Sdft => &self.sdft,
            Kernel::Resize => &self.resize,
            Kernel::Filter => &self.filter,
            Kernel::Sum => &self.sum,
        }
    }

    fn create_pipeline(
        device: &Device,
        kernel: Kernel,
        code: &str,
        storage_layout: &BindGroupLayout,
        params_layout: &BindGroupLayout,
    ) -> Result<ComputePipeline, ComputeError> {
        log::debug!("Compiling {} kernel", kernel.name());
        // Invalid WGSL from a kernel directory surfaces here instead of in the
        // device's uncaptured error handler.
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.name()),
            source: wgpu::ShaderSource::Wgsl(code.into()),
        });

        let mut layouts: Vec<&BindGroupLayout> = vec![storage_layout; kernel.storage_groups()];
        layouts.push(params_layout);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_pipeline_layout", kernel.name())),
            bind_group_layouts: &layouts,
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{}_pipeline", kernel.name())),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        match pollster::block_on(scope.pop()) {
            Some(err) => Err(ComputeError::ShaderCompile {
                kernel: kernel.name(),
                message: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_sources_declare_entry_point() {
        for kernel in Kernel::ALL {
            let code = KernelSource::Embedded.load(kernel).unwrap();
            assert!(code.contains("fn main"), "{} has no entry point", kernel.name());
        }
    }

    #[test]
    fn test_directory_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sum.wgsl"), "// custom").unwrap();
        let source = KernelSource::Directory(dir.path().to_path_buf());
        assert_eq!(source.load(Kernel::Sum).unwrap(), "// custom");
    }

    #[test]
    fn test_missing_kernel_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = KernelSource::Directory(dir.path().to_path_buf());
        match source.load(Kernel::Sdft) {
            Err(ComputeError::ShaderLoad { kernel, .. }) => assert_eq!(kernel, "sdft"),
            other => panic!("expected a shader load error, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_kernel_uses_three_storage_groups() {
        assert_eq!(Kernel::Filter.storage_groups(), 3);
        assert_eq!(Kernel::Sdft.storage_groups(), 2);
    }
}
