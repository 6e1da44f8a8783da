//! The frame engine: acquire, record, submit and present one frame at a time.

use crate::command::CommandPool;
use crate::dispatch::Dispatch;
use crate::error::{GpuError, Result};
use crate::overlay::DebugOverlay;
use crate::swapchain::{RenderTarget, Swapchain};
use crate::sync::{wait_for_fence, Buffered, RenderSync, FRAMES_IN_FLIGHT, RENDER_FENCE_TIMEOUT};
use ash::vk;
use glam::IVec2;
use std::sync::Arc;
use std::time::Duration;

/// Opaque black.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything the application's draw callback may record against.
pub struct DrawContext<'a, O> {
    /// Command buffer inside the clear-op rendering scope.
    pub command_buffer: vk::CommandBuffer,
    /// Virtual frame slot in `[0, FRAMES_IN_FLIGHT)`.
    pub frame_index: usize,
    /// Window framebuffer size the frame was acquired for.
    pub framebuffer_size: IVec2,
    /// The acquired swapchain image.
    pub target: RenderTarget,
    /// Overlay to add widgets to.
    pub overlay: &'a mut O,
}

/// Drives the per-frame lifecycle across [`FRAMES_IN_FLIGHT`] virtual frames.
///
/// A frame is: [`acquire_render_target`](Self::acquire_render_target),
/// [`begin_frame`](Self::begin_frame),
/// [`transition_for_render`](Self::transition_for_render),
/// [`render`](Self::render),
/// [`transition_for_present`](Self::transition_for_present),
/// [`submit_and_present`](Self::submit_and_present). [`frame`](Self::frame)
/// runs all of them.
pub struct FrameEngine<D: Dispatch, O: DebugOverlay> {
    dispatch: Arc<D>,
    queue: vk::Queue,
    overlay: O,
    render_sync: Buffered<RenderSync<D>>,
    /// Owns the per-frame command buffers.
    _render_pool: CommandPool<D>,
    swapchain: Swapchain<D>,
    frame_index: usize,
    framebuffer_size: IVec2,
    render_target: Option<RenderTarget>,
    clear_color: [f32; 4],
    fence_timeout: Duration,
}

impl<D: Dispatch, O: DebugOverlay> FrameEngine<D, O> {
    /// Create the render command pool and per-frame sync objects around
    /// `swapchain`.
    ///
    /// # Safety
    /// `queue` must belong to the swapchain's queue family and be able to
    /// present to its surface.
    pub unsafe fn new(
        dispatch: &Arc<D>,
        swapchain: Swapchain<D>,
        queue: vk::Queue,
        overlay: O,
    ) -> Result<Self> {
        let queue_family = swapchain.descriptor().queue_family;

        // SAFETY: caller guarantees the device and queue family are valid.
        let render_pool = unsafe { CommandPool::resettable(dispatch, queue_family)? };
        // SAFETY: the pool was just created from this device.
        let command_buffers = unsafe { render_pool.allocate(FRAMES_IN_FLIGHT as u32)? };

        let render_sync = command_buffers
            .into_iter()
            // SAFETY: the device is valid.
            .map(|cmd| unsafe { RenderSync::new(dispatch, cmd) })
            .collect::<Result<Vec<_>>>()?
            .try_into()
            .map_err(|_| GpuError::Other("Wrong number of render command buffers".to_string()))?;

        let framebuffer_size = swapchain.size();

        Ok(Self {
            dispatch: Arc::clone(dispatch),
            queue,
            overlay,
            render_sync,
            _render_pool: render_pool,
            swapchain,
            frame_index: 0,
            framebuffer_size,
            render_target: None,
            clear_color: DEFAULT_CLEAR_COLOR,
            fence_timeout: RENDER_FENCE_TIMEOUT,
        })
    }

    /// Override how long to wait for a virtual frame's previous submission.
    #[must_use]
    pub const fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Wait for the current virtual frame to be free and acquire an image.
    ///
    /// Returns `Ok(None)` without touching the GPU when the framebuffer has
    /// no area (minimized window), and after recreating the swapchain when
    /// it went out of date. The frame's fence is only reset once an image
    /// was acquired, so skipped frames never leave it unsignaled.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_render_target(&mut self, framebuffer_size: IVec2) -> Result<Option<RenderTarget>> {
        if framebuffer_size.x <= 0 || framebuffer_size.y <= 0 {
            return Ok(None);
        }
        self.framebuffer_size = framebuffer_size;

        let sync = &self.render_sync[self.frame_index];
        // SAFETY: the fence belongs to this device.
        unsafe {
            wait_for_fence(&*self.dispatch, *sync.drawn, self.fence_timeout, "render fence")?;
        }

        let Some(target) = self.swapchain.acquire_next_image(*sync.draw)? else {
            tracing::debug!(
                "Swapchain out of date, recreating at {}x{}",
                framebuffer_size.x,
                framebuffer_size.y
            );
            self.swapchain.recreate(framebuffer_size)?;
            return Ok(None);
        };

        // SAFETY: the fence is signaled and not in use by a pending submit.
        unsafe { self.dispatch.reset_fences(std::slice::from_ref(&*sync.drawn))? };
        self.overlay.new_frame();

        self.render_target = Some(target);
        Ok(Some(target))
    }

    fn require_target(&self) -> Result<RenderTarget> {
        self.render_target
            .ok_or_else(|| GpuError::InvalidState("No render target acquired".to_string()))
    }

    /// Begin recording the current virtual frame's command buffer.
    pub fn begin_frame(&mut self) -> Result<vk::CommandBuffer> {
        self.require_target()?;
        let cmd = self.render_sync[self.frame_index].command_buffer;

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the frame's fence was waited on, so the buffer is idle; the
        // pool allows implicit resets.
        unsafe { self.dispatch.begin_command_buffer(cmd, &begin_info)? };
        Ok(cmd)
    }

    /// Move the acquired image into the color attachment layout.
    pub fn transition_for_render(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.require_target()?;
        self.image_barrier(
            cmd,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
        )
    }

    /// Move the acquired image into the present layout.
    pub fn transition_for_present(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.require_target()?;
        self.image_barrier(
            cmd,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
    }

    fn image_barrier(
        &self,
        cmd: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        let barrier = self
            .swapchain
            .base_barrier()
            .ok_or_else(|| GpuError::InvalidState("No swapchain image acquired".to_string()))?
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            )
            .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            )
            .old_layout(old_layout)
            .new_layout(new_layout);

        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        // SAFETY: `cmd` is recording and the image is acquired.
        unsafe { self.dispatch.cmd_pipeline_barrier2(cmd, &dependency_info) };
        Ok(())
    }

    /// Record the frame's two rendering scopes.
    ///
    /// The first clears the image and runs `draw`; the second loads the
    /// result and renders the overlay on top.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn render<F>(&mut self, cmd: vk::CommandBuffer, draw: F) -> Result<()>
    where
        F: FnOnce(&mut DrawContext<'_, O>),
    {
        let target = self.require_target()?;

        self.begin_rendering(cmd, &target, vk::AttachmentLoadOp::CLEAR);
        let mut ctx = DrawContext {
            command_buffer: cmd,
            frame_index: self.frame_index,
            framebuffer_size: self.framebuffer_size,
            target,
            overlay: &mut self.overlay,
        };
        draw(&mut ctx);
        // SAFETY: a rendering scope is open on `cmd`.
        unsafe { self.dispatch.cmd_end_rendering(cmd) };

        self.overlay.end_frame();

        self.begin_rendering(cmd, &target, vk::AttachmentLoadOp::LOAD);
        self.overlay.render(cmd);
        // SAFETY: a rendering scope is open on `cmd`.
        unsafe { self.dispatch.cmd_end_rendering(cmd) };

        Ok(())
    }

    fn begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        target: &RenderTarget,
        load_op: vk::AttachmentLoadOp,
    ) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target.image_view)
            .image_layout(vk::ImageLayout::ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: target.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        // SAFETY: `cmd` is recording and the image is in attachment layout.
        unsafe { self.dispatch.cmd_begin_rendering(cmd, &rendering_info) };
    }

    /// Submit the frame and present it.
    ///
    /// The frame index advances whatever the present outcome. The swapchain
    /// is recreated when the framebuffer size no longer matches it or the
    /// present reported it out of date.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit_and_present(&mut self) -> Result<()> {
        self.require_target()?;
        let sync = &self.render_sync[self.frame_index];
        let cmd = sync.command_buffer;

        // SAFETY: the buffer is recording.
        unsafe { self.dispatch.end_command_buffer(cmd)? };

        let wait_info = [vk::SemaphoreSubmitInfo::default()
            .semaphore(*sync.draw)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal_info = [vk::SemaphoreSubmitInfo::default()
            .semaphore(*sync.present)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let command_buffer_info = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_info)
            .signal_semaphore_infos(&signal_info)
            .command_buffer_infos(&command_buffer_info);

        // SAFETY: the fence was reset at acquire and the buffer is executable.
        unsafe {
            self.dispatch
                .queue_submit2(self.queue, std::slice::from_ref(&submit_info), *sync.drawn)?;
        }

        let present_semaphore = *sync.present;
        self.frame_index = (self.frame_index + 1) % FRAMES_IN_FLIGHT;
        self.render_target = None;

        let size_changed = self.framebuffer_size != self.swapchain.size();
        let presented = self.swapchain.present(self.queue, present_semaphore)?;

        if size_changed || !presented {
            if !presented {
                tracing::debug!("Swapchain out of date after present");
            }
            self.swapchain.recreate(self.framebuffer_size)?;
        }

        Ok(())
    }

    /// Run one full frame. Returns `false` when the frame was skipped.
    pub fn frame<F>(&mut self, framebuffer_size: IVec2, draw: F) -> Result<bool>
    where
        F: FnOnce(&mut DrawContext<'_, O>),
    {
        if self.acquire_render_target(framebuffer_size)?.is_none() {
            return Ok(false);
        }

        let cmd = self.begin_frame()?;
        self.transition_for_render(cmd)?;
        self.render(cmd, draw)?;
        self.transition_for_present(cmd)?;
        self.submit_and_present()?;

        Ok(true)
    }

    /// Current virtual frame slot.
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Framebuffer size recorded by the last acquire.
    pub const fn framebuffer_size(&self) -> IVec2 {
        self.framebuffer_size
    }

    /// The image being recorded, between acquire and submit.
    pub const fn render_target(&self) -> Option<RenderTarget> {
        self.render_target
    }

    pub const fn swapchain(&self) -> &Swapchain<D> {
        &self.swapchain
    }

    pub const fn overlay(&self) -> &O {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut O {
        &mut self.overlay
    }

    pub const fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }
}

impl<D: Dispatch, O: DebugOverlay> Drop for FrameEngine<D, O> {
    fn drop(&mut self) {
        // SAFETY: the device outlives the engine.
        if let Err(e) = unsafe { self.dispatch.device_wait_idle() } {
            tracing::error!("Failed to wait for device idle during teardown: {e}");
        }
        tracing::debug!("Frame engine destroyed");
    }
}
