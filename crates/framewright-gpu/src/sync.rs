//! Synchronization primitives for frames in flight.

use crate::dispatch::{owned, Dispatch, Owned};
use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;
use std::time::Duration;

/// Number of virtual frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// How long to wait for a virtual frame's previous submission.
pub const RENDER_FENCE_TIMEOUT: Duration = Duration::from_secs(3);

/// One value per virtual frame.
pub type Buffered<T> = [T; FRAMES_IN_FLIGHT];

/// Duration as the nanosecond count Vulkan expects.
pub fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Create a semaphore.
///
/// # Safety
/// The dispatch table's device must be valid.
pub unsafe fn create_semaphore<D: Dispatch>(dispatch: &Arc<D>) -> Result<Owned<vk::Semaphore, D>> {
    let create_info = vk::SemaphoreCreateInfo::default();
    // SAFETY: caller guarantees the device is valid.
    let semaphore = unsafe { dispatch.create_semaphore(&create_info)? };
    Ok(owned(dispatch, semaphore))
}

/// Create a fence.
///
/// # Safety
/// The dispatch table's device must be valid.
pub unsafe fn create_fence<D: Dispatch>(dispatch: &Arc<D>, signaled: bool) -> Result<Owned<vk::Fence, D>> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    // SAFETY: caller guarantees the device is valid.
    let fence = unsafe { dispatch.create_fence(&create_info)? };
    Ok(owned(dispatch, fence))
}

/// Wait for a fence to be signaled.
///
/// `VK_TIMEOUT` becomes [`GpuError::FenceTimeout`] naming `what`.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence<D: Dispatch>(
    dispatch: &D,
    fence: vk::Fence,
    timeout: Duration,
    what: &'static str,
) -> Result<()> {
    // SAFETY: caller guarantees device and fence are valid.
    match unsafe { dispatch.wait_for_fences(&[fence], true, timeout_ns(timeout)) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::FenceTimeout { what, timeout }),
        Err(e) => Err(e.into()),
    }
}

/// Synchronization objects and command buffer of one virtual frame.
pub struct RenderSync<D: Dispatch> {
    /// Signaled when the acquired image may be drawn to.
    pub draw: Owned<vk::Semaphore, D>,
    /// Signaled when drawing is complete and the image may be presented.
    pub present: Owned<vk::Semaphore, D>,
    /// Signaled when the frame's last submission finished. Created signaled.
    pub drawn: Owned<vk::Fence, D>,
    /// Primary command buffer, reset on every begin.
    pub command_buffer: vk::CommandBuffer,
}

impl<D: Dispatch> RenderSync<D> {
    /// Create the sync objects around an already allocated command buffer.
    ///
    /// # Safety
    /// The dispatch table's device must be valid.
    pub unsafe fn new(dispatch: &Arc<D>, command_buffer: vk::CommandBuffer) -> Result<Self> {
        // SAFETY: caller guarantees the device is valid.
        unsafe {
            Ok(Self {
                draw: create_semaphore(dispatch)?,
                present: create_semaphore(dispatch)?,
                drawn: create_fence(dispatch, true)?,
                command_buffer,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_convert_to_nanoseconds() {
        assert_eq!(timeout_ns(RENDER_FENCE_TIMEOUT), 3_000_000_000);
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }
}
