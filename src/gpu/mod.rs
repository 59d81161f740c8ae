//! GPU resources and compute using wgpu.
//!
//! Provides the device context, the per-segment chunk of buffers and recorded
//! passes, and the host-side synchronization that orders them across queue
//! roles.

pub mod binding;
pub mod chunk;
pub mod compute;
pub mod context;
pub mod queues;
pub mod sync;
pub mod textures;

pub use binding::{Binding, BindingError, LayoutCache};
pub use chunk::{Chunk, FenceId, PassId, SemaphoreId};
pub use compute::{BufferId, ChunkLayout, ComputeError, KernelCatalog, KernelSource};
pub use context::{ContextOptions, DeviceContext, GpuError};
pub use queues::{QueueFamily, QueueRole, QueueRoles};
pub use textures::{ImageKind, StorageImage};
