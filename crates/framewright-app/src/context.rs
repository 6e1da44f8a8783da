//! Application context.

use std::sync::Arc;

use ash::vk;
use framewright_gpu::{CommandBlock, CommandPool, GpuAllocator, GpuContext, GpuContextBuilder, VulkanDispatch};
use glam::IVec2;
use winit::window::Window;

use crate::runner::AppConfig;

/// Application context shared across all app methods.
///
/// Owns the GPU context for the window and a transient command pool for
/// uploads. Field order is drop order, the window goes last.
pub struct AppContext {
    command_pool: CommandPool<VulkanDispatch>,
    gpu: GpuContext,
    pub(crate) color_format: vk::Format,
    /// The window handle.
    pub window: Arc<Window>,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(window: Arc<Window>, config: &AppConfig) -> anyhow::Result<Self> {
        // SAFETY: the context stores the window and outlives nothing it owns.
        let gpu = unsafe {
            GpuContextBuilder::new()
                .app_name(&config.title)
                .validation(config.validation)
                .build(window.as_ref())?
        };

        // SAFETY: the queue family was requested at device creation.
        let command_pool = unsafe { CommandPool::transient(gpu.dispatch(), gpu.queue_family())? };

        Ok(Self {
            command_pool,
            gpu,
            color_format: vk::Format::UNDEFINED,
            window,
        })
    }

    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    pub const fn dispatch(&self) -> &Arc<VulkanDispatch> {
        self.gpu.dispatch()
    }

    pub const fn allocator(&self) -> &GpuAllocator {
        self.gpu.allocator()
    }

    pub const fn queue(&self) -> vk::Queue {
        self.gpu.queue()
    }

    /// Format of the swapchain images pipelines render into.
    pub const fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Pool for one-shot command buffers.
    pub const fn command_pool(&self) -> &CommandPool<VulkanDispatch> {
        &self.command_pool
    }

    /// Begin a one-shot command buffer on the graphics queue.
    pub fn command_block(&self) -> anyhow::Result<CommandBlock<VulkanDispatch>> {
        // SAFETY: the pool was created for the graphics queue family.
        Ok(unsafe { self.command_pool.command_block(self.gpu.queue())? })
    }

    /// Current window framebuffer size in pixels.
    pub fn framebuffer_size(&self) -> IVec2 {
        let size = self.window.inner_size();
        IVec2::new(
            i32::try_from(size.width).unwrap_or(i32::MAX),
            i32::try_from(size.height).unwrap_or(i32::MAX),
        )
    }

    /// Width divided by height of the framebuffer.
    pub fn aspect_ratio(&self) -> f32 {
        let size = self.framebuffer_size().max(IVec2::ONE).as_vec2();
        size.x / size.y
    }
}
