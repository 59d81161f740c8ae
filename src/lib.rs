//! SDFT Filter
//!
//! GPU-resident sliding DFT spectral filter.
//!
//! # Features
//!
//! - Sliding DFT of a signal segment via log-depth butterfly kernels on wgpu
//! - Inverse transform and overlap-averaged resynthesis
//! - Time-frequency masking: a host mask becomes per-window FIR filters
//!   applied by a multiply and tree-reduce on the device
//! - Spectrogram visualization images and greyscale export
//! - RustFFT host reference for verification

pub mod engine;
pub mod gpu;
pub mod mask;
pub mod reference;
pub mod spectrogram;
pub mod synth;

// Re-export commonly used types
pub use engine::{EngineConfig, EngineError, SdftEngine};
pub use gpu::{ContextOptions, DeviceContext, GpuError, ImageKind};
pub use mask::{pack_gain, unpack_gain, Mask};
pub use reference::{tone_level_db, ReferenceSdft};
pub use spectrogram::{ComplexSpectrogram, Spectrogram};
