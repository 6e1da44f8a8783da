//! Command pools and one-shot command blocks.

use crate::dispatch::{owned, Dispatch, Owned};
use crate::error::{GpuError, Result};
use crate::sync::{create_fence, wait_for_fence};
use ash::vk;
use std::sync::Arc;
use std::time::Duration;

/// How long [`CommandBlock::submit_and_wait`] waits for the GPU.
pub const COMMAND_BLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Command pool for allocating command buffers.
pub struct CommandPool<D: Dispatch> {
    dispatch: Arc<D>,
    pool: Owned<vk::CommandPool, D>,
    queue_family: u32,
}

impl<D: Dispatch> CommandPool<D> {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        dispatch: &Arc<D>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: caller guarantees the device is valid.
        let pool = unsafe { dispatch.create_command_pool(&create_info)? };

        Ok(Self {
            dispatch: Arc::clone(dispatch),
            pool: owned(dispatch, pool),
            queue_family,
        })
    }

    /// Pool for short-lived command blocks.
    ///
    /// # Safety
    /// See [`Self::new`].
    pub unsafe fn transient(dispatch: &Arc<D>, queue_family: u32) -> Result<Self> {
        // SAFETY: forwarded to the caller.
        unsafe { Self::new(dispatch, queue_family, vk::CommandPoolCreateFlags::TRANSIENT) }
    }

    /// Pool whose buffers are reset individually every frame.
    ///
    /// # Safety
    /// See [`Self::new`].
    pub unsafe fn resettable(dispatch: &Arc<D>, queue_family: u32) -> Result<Self> {
        // SAFETY: forwarded to the caller.
        unsafe {
            Self::new(
                dispatch,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        *self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: caller guarantees the device is valid.
        let buffers = unsafe { self.dispatch.allocate_command_buffers(&alloc_info)? };
        Ok(buffers)
    }

    /// Start a one-shot command block on `queue`.
    ///
    /// # Safety
    /// The device must be valid and `queue` must belong to this pool's family.
    pub unsafe fn command_block(&self, queue: vk::Queue) -> Result<CommandBlock<D>> {
        // SAFETY: forwarded to the caller.
        unsafe { CommandBlock::new(&self.dispatch, queue, self.handle()) }
    }
}

/// A one-shot command buffer that is submitted and waited on synchronously.
///
/// Recording starts on construction. [`Self::submit_and_wait`] consumes the
/// block, so it can run at most once. Dropping an unsubmitted block frees
/// its command buffer without submitting anything.
pub struct CommandBlock<D: Dispatch> {
    dispatch: Arc<D>,
    queue: vk::Queue,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl<D: Dispatch> CommandBlock<D> {
    /// Allocate a primary command buffer from `pool` and begin recording.
    ///
    /// # Safety
    /// The device must be valid, and `pool` must outlive the block.
    pub unsafe fn new(dispatch: &Arc<D>, queue: vk::Queue, pool: vk::CommandPool) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: caller guarantees the device and pool are valid.
        let command_buffer = unsafe { dispatch.allocate_command_buffers(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Other("No command buffer allocated".to_string()))?;

        let block = Self {
            dispatch: Arc::clone(dispatch),
            queue,
            pool,
            command_buffer,
        };

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the buffer was just allocated and is not recording.
        unsafe { dispatch.begin_command_buffer(command_buffer, &begin_info)? };

        Ok(block)
    }

    /// The recording command buffer.
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// The dispatch table to record commands through.
    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    /// End recording, submit, and block until the GPU has finished.
    ///
    /// Waits at most [`COMMAND_BLOCK_TIMEOUT`]. On timeout the failure is
    /// logged, the device is drained, and `FenceTimeout` is returned; the
    /// command buffer is freed in every case.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn submit_and_wait(self) -> Result<()> {
        // SAFETY: the buffer is recording and owned by this block.
        unsafe { self.dispatch.end_command_buffer(self.command_buffer)? };

        // SAFETY: the device is valid for the lifetime of the dispatch table.
        let fence = unsafe { create_fence(&self.dispatch, false)? };

        let command_buffer_info =
            [vk::CommandBufferSubmitInfo::default().command_buffer(self.command_buffer)];
        let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&command_buffer_info);

        // SAFETY: the buffer is executable and the fence is unsignaled.
        unsafe {
            self.dispatch
                .queue_submit2(self.queue, std::slice::from_ref(&submit_info), *fence)?;
        }

        // SAFETY: the fence is valid until dropped below.
        let waited = unsafe {
            wait_for_fence(&*self.dispatch, *fence, COMMAND_BLOCK_TIMEOUT, "command block")
        };

        if let Err(e) = &waited {
            tracing::error!("Failed to submit command block: {e}");
            // Resources referenced by the block may be released by the
            // caller as soon as this returns.
            // SAFETY: the device is valid.
            if let Err(idle) = unsafe { self.dispatch.device_wait_idle() } {
                tracing::error!("Failed to drain device after command block: {idle}");
            }
        }

        waited
    }
}

impl<D: Dispatch> Drop for CommandBlock<D> {
    fn drop(&mut self) {
        // SAFETY: the buffer is either never submitted or its submission has
        // completed (or the device was drained).
        unsafe {
            self.dispatch
                .free_command_buffers(self.pool, std::slice::from_ref(&self.command_buffer));
        }
    }
}
