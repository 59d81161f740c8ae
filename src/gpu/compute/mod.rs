//! Compute kernels, their parameters and the passes that sequence them.
//!
//! Nothing here submits work: passes are recorded once per chunk and replayed
//! by the engine.

pub mod buffers;
pub mod filter;
pub mod params;
pub mod pass;
pub mod pingpong;
pub mod pipelines;
pub mod sdft;

pub use buffers::{BufferId, ChunkBuffers, ChunkLayout};
pub use pass::{PassResources, RecordedPass, Step};
pub use pipelines::{Kernel, KernelCatalog, KernelSource};

use std::path::PathBuf;

/// Errors raised while preparing or replaying compute work.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("failed to read {kernel} kernel from {}: {source}", path.display())]
    ShaderLoad {
        kernel: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{kernel} kernel failed to compile: {message}")]
    ShaderCompile { kernel: &'static str, message: String },
    #[error("{what} needs {requested} but the device allows {limit}")]
    Limit {
        what: &'static str,
        requested: u64,
        limit: u64,
    },
    #[error("no bind group for `{0}`")]
    MissingBinding(&'static str),
    #[error(transparent)]
    Binding(#[from] crate::gpu::binding::BindingError),
    #[error("GPU buffer mapping failed: {0}")]
    BufferMapFailed(String),
}
