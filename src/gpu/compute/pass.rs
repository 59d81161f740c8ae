//! Pre-recorded command sequences.
//!
//! A [`RecordedPass`] is fixed at chunk setup: its dispatches, barriers and
//! copies never change afterwards, and every per-dispatch parameter block has
//! already been written to the chunk's parameter arena. Submitting a pass
//! replays it into a fresh encoder.

use wgpu::{BindGroup, Buffer, CommandEncoder, ComputePipeline};

use super::buffers::{BufferId, COMPLEX_SIZE};
use super::pipelines::Kernel;
use super::ComputeError;

/// One kernel launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub kernel: Kernel,
    /// Storage groups in binding-set order.
    pub groups: Vec<BufferId>,
    pub params_offset: u32,
    pub workgroups: [u32; 3],
}

/// Buffer copy expressed in complex elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src: BufferId,
    pub src_offset: u64,
    pub dst: BufferId,
    pub dst_offset: u64,
    pub elements: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Dispatch(Dispatch),
    /// Writes to the buffer become visible to later steps.
    Barrier(BufferId),
    Copy(BufferCopy),
}

/// What a pass needs to resolve its ids at submit time.
pub trait PassResources {
    fn buffer(&self, id: BufferId) -> &Buffer;
    fn group(&self, id: BufferId) -> Option<&BindGroup>;
    fn params(&self) -> &BindGroup;
    fn pipeline(&self, kernel: Kernel) -> &ComputePipeline;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPass {
    label: &'static str,
    steps: Vec<Step>,
}

impl RecordedPass {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn dispatches(&self) -> impl Iterator<Item = &Dispatch> {
        self.steps.iter().filter_map(|step| match step {
            Step::Dispatch(d) => Some(d),
            _ => None,
        })
    }

    pub fn dispatch(
        &mut self,
        kernel: Kernel,
        groups: Vec<BufferId>,
        params_offset: u32,
        workgroups: [u32; 3],
    ) {
        debug_assert_eq!(groups.len(), kernel.storage_groups());
        self.steps.push(Step::Dispatch(Dispatch {
            kernel,
            groups,
            params_offset,
            workgroups,
        }));
    }

    pub fn barrier(&mut self, buffer: BufferId) {
        self.steps.push(Step::Barrier(buffer));
    }

    pub fn copy(&mut self, src: BufferId, src_offset: u64, dst: BufferId, elements: u64) {
        self.steps.push(Step::Copy(BufferCopy {
            src,
            src_offset,
            dst,
            dst_offset: 0,
            elements,
        }));
    }

    /// Replay the pass into `encoder`.
    ///
    /// Consecutive dispatches share a compute pass; a barrier or copy closes it,
    /// so writes before a barrier are visible to every step after it.
    pub fn encode<R: PassResources>(
        &self,
        encoder: &mut CommandEncoder,
        resources: &R,
    ) -> Result<(), ComputeError> {
        let mut index = 0;
        while index < self.steps.len() {
            match &self.steps[index] {
                Step::Barrier(_) => index += 1,
                Step::Copy(copy) => {
                    encoder.copy_buffer_to_buffer(
                        resources.buffer(copy.src),
                        copy.src_offset * COMPLEX_SIZE,
                        resources.buffer(copy.dst),
                        copy.dst_offset * COMPLEX_SIZE,
                        copy.elements * COMPLEX_SIZE,
                    );
                    index += 1;
                }
                Step::Dispatch(_) => {
                    let end = self.steps[index..]
                        .iter()
                        .position(|step| !matches!(step, Step::Dispatch(_)))
                        .map_or(self.steps.len(), |offset| index + offset);
                    self.encode_dispatches(encoder, resources, &self.steps[index..end])?;
                    index = end;
                }
            }
        }
        Ok(())
    }

    fn encode_dispatches<R: PassResources>(
        &self,
        encoder: &mut CommandEncoder,
        resources: &R,
        steps: &[Step],
    ) -> Result<(), ComputeError> {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        for step in steps {
            let Step::Dispatch(dispatch) = step else {
                continue;
            };
            pass.set_pipeline(resources.pipeline(dispatch.kernel));
            for (slot, id) in dispatch.groups.iter().enumerate() {
                let group = resources
                    .group(*id)
                    .ok_or(ComputeError::MissingBinding(id.label()))?;
                pass.set_bind_group(slot as u32, group, &[]);
            }
            pass.set_bind_group(
                dispatch.groups.len() as u32,
                resources.params(),
                &[dispatch.params_offset],
            );
            let [x, y, z] = dispatch.workgroups;
            pass.dispatch_workgroups(x, y, z);
        }
        Ok(())
    }
}
