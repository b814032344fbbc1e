//! Fence-based host/device synchronization.

use crate::error::{GpuError, Result};
use crate::teardown::{PendingTeardown, TeardownStack};
use ash::vk;

/// Host-side view of a fence's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// Created unsignaled, no work attached.
    Unsubmitted,
    /// Attached to a submission that may still be running.
    Pending,
    /// The attached submission has completed.
    Signaled,
}

impl FenceState {
    /// Attach the fence to a submission.
    pub fn submit(&mut self) -> Result<()> {
        match self {
            Self::Unsubmitted => {
                *self = Self::Pending;
                Ok(())
            }
            Self::Pending | Self::Signaled => Err(GpuError::InvalidState(
                "Fence is already attached to a submission".to_string(),
            )),
        }
    }

    /// Whether waiting must call into the driver.
    ///
    /// A fence that was never submitted can never signal, so waiting on it
    /// is rejected instead of blocking until the timeout.
    pub fn needs_wait(self) -> Result<bool> {
        match self {
            Self::Unsubmitted => Err(GpuError::InvalidState(
                "Waiting on a fence that was never submitted".to_string(),
            )),
            Self::Pending => Ok(true),
            Self::Signaled => Ok(false),
        }
    }

    /// Record that the wait succeeded.
    pub fn signal(&mut self) {
        *self = Self::Signaled;
    }
}

/// Proof that submitted work has finished executing on the device.
///
/// Only a successful [`Fence::wait`] produces one, so host reads of device
/// results can require it.
#[derive(Debug)]
pub struct Completion {
    _private: (),
}

/// A binary fence signaled once by one submission.
#[derive(Debug)]
pub struct Fence {
    handle: vk::Fence,
    state: FenceState,
}

impl Fence {
    /// Create an unsignaled fence.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, teardown: &mut TeardownStack) -> Result<Self> {
        let create_info = vk::FenceCreateInfo::default();
        let handle = unsafe { device.create_fence(&create_info, None) }
            .map_err(GpuError::creating("fence"))?;
        teardown.push(PendingTeardown::Fence(handle));

        Ok(Self {
            handle,
            state: FenceState::Unsubmitted,
        })
    }

    /// Get the raw fence handle.
    pub const fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Current host-side state.
    pub const fn state(&self) -> FenceState {
        self.state
    }

    /// Submit one command buffer with this fence as its completion signal.
    ///
    /// # Safety
    /// All handles must be valid and the command buffer must be executable.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit(
        &mut self,
        device: &ash::Device,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
    ) -> Result<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        self.attach(|fence| unsafe { device.queue_submit(queue, &[submit_info], fence) })?;

        tracing::debug!("Submitted command buffer");
        Ok(())
    }

    /// Run `submit` with this fence as its signal and mark the fence pending
    /// only if the submission was accepted.
    fn attach(&mut self, submit: impl FnOnce(vk::Fence) -> ash::prelude::VkResult<()>) -> Result<()> {
        let mut next = self.state;
        next.submit()?;
        submit(self.handle).map_err(GpuError::Submission)?;
        self.state = next;
        Ok(())
    }

    /// Block until the fence signals or `timeout_ns` elapses.
    ///
    /// A timeout is reported as [`GpuError::Sync`] like any other wait
    /// failure. Waiting again after success returns immediately.
    ///
    /// # Safety
    /// The device must be the one that created the fence.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn wait(&mut self, device: &ash::Device, timeout_ns: u64) -> Result<Completion> {
        if self.state.needs_wait()? {
            unsafe { device.wait_for_fences(&[self.handle], true, timeout_ns) }
                .map_err(GpuError::Sync)?;
            self.state.signal();
            tracing::debug!("Fence signaled");
        }

        Ok(Completion { _private: () })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn lifecycle() {
        let mut state = FenceState::Unsubmitted;
        state.submit().unwrap();
        assert_eq!(state, FenceState::Pending);
        assert!(state.needs_wait().unwrap());
        state.signal();
        assert_eq!(state, FenceState::Signaled);
    }

    #[test]
    fn signaled_fence_does_not_wait() {
        assert!(!FenceState::Signaled.needs_wait().unwrap());
    }

    #[test]
    fn never_submitted_fence_is_rejected() {
        let err = FenceState::Unsubmitted.needs_wait().unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
    }

    #[test]
    fn fence_submitted_once() {
        let mut state = FenceState::Unsubmitted;
        state.submit().unwrap();
        assert!(state.submit().is_err());

        let mut state = FenceState::Signaled;
        assert!(state.submit().is_err());
    }

    fn fence() -> Fence {
        Fence {
            handle: vk::Fence::from_raw(5),
            state: FenceState::Unsubmitted,
        }
    }

    #[test]
    fn rejected_submission_leaves_fence_unsubmitted() {
        let mut fence = fence();
        let err = fence
            .attach(|_| Err(vk::Result::ERROR_DEVICE_LOST))
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Submission(vk::Result::ERROR_DEVICE_LOST)
        ));
        assert_eq!(fence.state(), FenceState::Unsubmitted);
        assert!(matches!(
            fence.state().needs_wait(),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn accepted_submission_signals_this_fence() {
        let mut fence = fence();
        let mut signaled = None;
        fence
            .attach(|handle| {
                signaled = Some(handle);
                Ok(())
            })
            .unwrap();
        assert_eq!(signaled, Some(vk::Fence::from_raw(5)));
        assert_eq!(fence.state(), FenceState::Pending);
        assert!(fence.attach(|_| Ok(())).is_err());
    }
}
