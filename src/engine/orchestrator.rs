//! Ordering of recorded passes across queue roles.
//!
//! A flow is a fixed list of submissions. Each names the queue role it runs on,
//! the semaphores it must find signaled, the semaphores it signals and
//! optionally the fence the host waits on afterwards.

use super::EngineError;
use crate::gpu::chunk::{Chunk, FenceId, PassId, SemaphoreId};
use crate::gpu::compute::pass::RecordedPass;
use crate::gpu::compute::{BufferId, KernelCatalog};
use crate::gpu::queues::QueueRole;
use crate::gpu::DeviceContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub role: QueueRole,
    pub pass: PassId,
    pub waits: &'static [SemaphoreId],
    pub signals: &'static [SemaphoreId],
    pub fence: Option<FenceId>,
}

/// Upload, forward transform, download.
pub const FORWARD_FLOW: [Submission; 3] = [
    Submission {
        role: QueueRole::Transfer,
        pass: PassId::UploadSdft,
        waits: &[],
        signals: &[SemaphoreId::Uploaded],
        fence: None,
    },
    Submission {
        role: QueueRole::Compute,
        pass: PassId::ForwardSdft,
        waits: &[SemaphoreId::Uploaded],
        signals: &[SemaphoreId::Processed],
        fence: None,
    },
    Submission {
        role: QueueRole::Transfer,
        pass: PassId::DownloadSdft,
        waits: &[SemaphoreId::Processed],
        signals: &[],
        fence: Some(FenceId::Sdft),
    },
];

/// Mask resample, filter derivation, multiply and reduce.
pub const FILTER_FLOW: [Submission; 3] = [
    Submission {
        role: QueueRole::Compute,
        pass: PassId::MaskRead,
        waits: &[],
        signals: &[SemaphoreId::MaskRead],
        fence: None,
    },
    Submission {
        role: QueueRole::Compute,
        pass: PassId::MaskSdft,
        waits: &[SemaphoreId::MaskRead],
        signals: &[SemaphoreId::FiltersReady],
        fence: None,
    },
    Submission {
        role: QueueRole::Filter,
        pass: PassId::Filter,
        waits: &[SemaphoreId::FiltersReady],
        signals: &[],
        fence: Some(FenceId::Filter),
    },
];

/// Inverse transform and download.
pub const SYNTHESIS_FLOW: [Submission; 2] = [
    Submission {
        role: QueueRole::Compute,
        pass: PassId::Synthesis,
        waits: &[],
        signals: &[SemaphoreId::Synthesized],
        fence: None,
    },
    Submission {
        role: QueueRole::Transfer,
        pass: PassId::DownloadSynthesis,
        waits: &[SemaphoreId::Synthesized],
        signals: &[],
        fence: Some(FenceId::Sdft),
    },
];

/// A copy issued outside the recorded graph, in complex elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneShotCopy {
    pub src: BufferId,
    pub src_offset: u64,
    pub dst: BufferId,
    pub elements: u64,
}

pub struct Orchestrator<'a> {
    context: &'a DeviceContext,
    catalog: &'a KernelCatalog,
}

impl<'a> Orchestrator<'a> {
    pub fn new(context: &'a DeviceContext, catalog: &'a KernelCatalog) -> Self {
        Self { context, catalog }
    }

    /// Submit one recorded pass.
    pub fn submit(&self, chunk: &mut Chunk, submission: &Submission) -> Result<(), EngineError> {
        for &id in submission.waits {
            chunk.sync().semaphore(id).wait()?;
        }

        let pass = chunk.pass(submission.pass).ok_or_else(|| {
            EngineError::DeviceOperation(format!("pass {:?} was never recorded", submission.pass))
        })?;
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(pass.label()),
                });
        pass.encode(&mut encoder, &chunk.bind(self.catalog))?;
        log::trace!(
            "Submitting {} on {} queue",
            pass.label(),
            submission.role.name()
        );
        let index = self
            .context
            .queue_for(submission.role)
            .submit(Some(encoder.finish()));

        for &id in submission.signals {
            chunk.sync().semaphore(id).signal(submission.role)?;
        }
        if let Some(fence) = submission.fence {
            chunk.sync().fence(fence).arm(index)?;
        }
        Ok(())
    }

    /// Submit a whole flow, then wait on and reset `fence`.
    pub fn run(
        &self,
        chunk: &mut Chunk,
        flow: &[Submission],
        fence: FenceId,
    ) -> Result<(), EngineError> {
        for submission in flow {
            self.submit(chunk, submission)?;
        }
        let fence = chunk.sync().fence(fence);
        fence.wait(&self.context.device)?;
        fence.reset();
        Ok(())
    }

    /// Record, submit and wait on copies outside the recorded graph.
    pub fn one_shot(
        &self,
        chunk: &Chunk,
        label: &'static str,
        copies: &[OneShotCopy],
    ) -> Result<(), EngineError> {
        let mut pass = RecordedPass::new(label);
        for copy in copies {
            pass.copy(copy.src, copy.src_offset, copy.dst, copy.elements);
        }

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(label),
                });
        pass.encode(&mut encoder, &chunk.bind(self.catalog))?;
        self.context
            .queue_for(QueueRole::Transfer)
            .submit(Some(encoder.finish()));
        self.context
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| EngineError::DeviceOperation(format!("{label}: {e}")))?;
        Ok(())
    }
}
