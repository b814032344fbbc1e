//! Submission of the recorded commands and the wait for their completion.

use ash::vk;
use clearcopy_gpu::{Completion, Fence, Result};

use crate::recorder::RecordedCommands;

/// Submit `commands` signaling `fence`, then block until the fence signals
/// or `timeout_ns` elapses.
///
/// Submission and wait failures are returned as-is; nothing is retried.
///
/// # Safety
/// All handles must belong to `device`, and every object the commands
/// reference must stay alive until this returns.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_and_wait(
    device: &ash::Device,
    queue: vk::Queue,
    fence: &mut Fence,
    commands: RecordedCommands,
    timeout_ns: u64,
) -> Result<Completion> {
    unsafe { fence.submit(device, queue, commands.command_buffer()) }?;
    unsafe { fence.wait(device, timeout_ns) }
}
