//! Cross-queue ordering and host completion.
//!
//! wgpu orders every submission on its single queue, so ordering between
//! logical queue roles is tracked on the host. A [`Semaphore`] records that a
//! producing submission has been issued; the consuming submission must find it
//! signaled before it is issued. A [`Fence`] holds the submission index the
//! host waits on.

use wgpu::{Device, SubmissionIndex};

use super::queues::QueueRole;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("semaphore `{0}` waited on before any submission signaled it")]
    Unsignaled(&'static str),
    #[error("semaphore `{0}` signaled again before its wait")]
    AlreadySignaled(&'static str),
    #[error("fence `{0}` waited on with no submission pending")]
    FenceIdle(&'static str),
    #[error("fence `{0}` armed again before reset")]
    FenceBusy(&'static str),
    #[error("device poll failed while waiting on fence `{label}`: {reason}")]
    Poll { label: &'static str, reason: String },
}

/// Binary device-to-device ordering point between two submissions.
#[derive(Debug)]
pub struct Semaphore {
    label: &'static str,
    signaled_by: Option<QueueRole>,
}

impl Semaphore {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            signaled_by: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled_by.is_some()
    }

    /// Mark the semaphore signaled by a submission issued on `role`.
    pub fn signal(&mut self, role: QueueRole) -> Result<(), SyncError> {
        if self.signaled_by.is_some() {
            return Err(SyncError::AlreadySignaled(self.label));
        }
        self.signaled_by = Some(role);
        Ok(())
    }

    /// Consume the signal ahead of the waiting submission. Returns the signaling role.
    pub fn wait(&mut self) -> Result<QueueRole, SyncError> {
        self.signaled_by
            .take()
            .ok_or(SyncError::Unsignaled(self.label))
    }
}

#[derive(Debug)]
enum FenceState {
    Idle,
    Pending(Option<SubmissionIndex>),
    Signaled,
}

/// Device-to-host completion signal for one submission.
#[derive(Debug)]
pub struct Fence {
    label: &'static str,
    state: FenceState,
}

impl Fence {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: FenceState::Idle,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_signaled(&self) -> bool {
        matches!(self.state, FenceState::Signaled)
    }

    /// Attach the fence to a submission. The fence must be reset first.
    pub fn arm(&mut self, submission: SubmissionIndex) -> Result<(), SyncError> {
        self.begin(Some(submission))
    }

    fn begin(&mut self, submission: Option<SubmissionIndex>) -> Result<(), SyncError> {
        match self.state {
            FenceState::Idle => {
                self.state = FenceState::Pending(submission);
                Ok(())
            }
            _ => Err(SyncError::FenceBusy(self.label)),
        }
    }

    /// Block until the armed submission completes. Waiting on a signaled fence returns at once.
    pub fn wait(&mut self, device: &Device) -> Result<(), SyncError> {
        let submission = match std::mem::replace(&mut self.state, FenceState::Idle) {
            FenceState::Idle => return Err(SyncError::FenceIdle(self.label)),
            FenceState::Signaled => {
                self.state = FenceState::Signaled;
                return Ok(());
            }
            FenceState::Pending(submission) => submission,
        };

        // Waiting for the queue to drain covers the armed submission and
        // everything issued before it.
        log::trace!("Waiting on fence {} ({:?})", self.label, submission);
        device.poll(wgpu::PollType::wait_indefinitely()).map_err(|e| SyncError::Poll {
            label: self.label,
            reason: e.to_string(),
        })?;
        self.state = FenceState::Signaled;
        Ok(())
    }

    /// Return the fence to the unsignaled, unarmed state.
    pub fn reset(&mut self) {
        self.state = FenceState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_signal_then_wait() {
        let mut sem = Semaphore::new("uploaded");
        sem.signal(QueueRole::Transfer).unwrap();
        assert!(sem.is_signaled());
        assert_eq!(sem.wait().unwrap(), QueueRole::Transfer);
        assert!(!sem.is_signaled());
    }

    #[test]
    fn test_semaphore_wait_without_signal() {
        let mut sem = Semaphore::new("processed");
        assert_eq!(sem.wait(), Err(SyncError::Unsignaled("processed")));
    }

    #[test]
    fn test_semaphore_double_signal() {
        let mut sem = Semaphore::new("mask_read");
        sem.signal(QueueRole::Compute).unwrap();
        assert_eq!(
            sem.signal(QueueRole::Compute),
            Err(SyncError::AlreadySignaled("mask_read"))
        );
    }

    #[test]
    fn test_fence_must_be_reset_before_rearm() {
        let mut fence = Fence::new("sdft");
        fence.begin(None).unwrap();
        assert_eq!(fence.begin(None), Err(SyncError::FenceBusy("sdft")));
        fence.reset();
        fence.begin(None).unwrap();
    }

    #[test]
    fn test_fence_reset_clears_signal() {
        let mut fence = Fence::new("filter");
        fence.state = FenceState::Signaled;
        assert!(fence.is_signaled());
        fence.reset();
        assert!(!fence.is_signaled());
    }
}
