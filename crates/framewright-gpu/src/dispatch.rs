//! Explicit Vulkan function table.
//!
//! The frame engine, swapchain manager and command blocks never call the
//! driver directly. They go through a [`Dispatch`] value handed to their
//! constructors, so each owner knows exactly which table it uses and tests
//! can substitute a recording stub.

use crate::scoped::{Release, Scoped};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

/// Device, queue, surface and swapchain entry points used by the core.
///
/// Methods mirror the `ash` signatures without allocation callbacks.
///
/// # Safety
/// Every method has the same requirements as the Vulkan command it wraps:
/// handles must be valid and owned by this table's device.
#[allow(clippy::missing_safety_doc)]
pub trait Dispatch {
    unsafe fn device_wait_idle(&self) -> VkResult<()>;

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        wait_all: bool,
        timeout_ns: u64,
    ) -> VkResult<()>;
    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;

    unsafe fn create_semaphore(
        &self,
        info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool);
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn queue_submit2(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> VkResult<()>;

    unsafe fn cmd_pipeline_barrier2(
        &self,
        cmd: vk::CommandBuffer,
        dependency: &vk::DependencyInfo<'_>,
    );
    unsafe fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &vk::RenderingInfo<'_>);
    unsafe fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    unsafe fn cmd_copy_buffer2(&self, cmd: vk::CommandBuffer, info: &vk::CopyBufferInfo2<'_>);
    unsafe fn cmd_copy_buffer_to_image2(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CopyBufferToImageInfo2<'_>,
    );

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    unsafe fn surface_formats(&self, surface: vk::SurfaceKHR)
        -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    unsafe fn surface_present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)>;
    unsafe fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>)
        -> VkResult<bool>;
}

/// [`Dispatch`] backed by a live `ash` device.
pub struct VulkanDispatch {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl VulkanDispatch {
    /// Load the surface and swapchain extension tables for `device`.
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        Self {
            device,
            physical_device,
            surface_loader,
            swapchain_loader,
        }
    }

    /// The wrapped logical device.
    pub const fn device(&self) -> &ash::Device {
        &self.device
    }

    /// The surface extension table.
    pub const fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Dispatch for VulkanDispatch {
    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        unsafe { self.device.create_fence(info, None) }
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        wait_all: bool,
        timeout_ns: u64,
    ) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(fences, wait_all, timeout_ns) }
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.device.reset_fences(fences) }
    }

    unsafe fn create_semaphore(
        &self,
        info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(info, None) }
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.device.allocate_command_buffers(info) }
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        unsafe { self.device.begin_command_buffer(cmd, info) }
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    unsafe fn queue_submit2(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        unsafe { self.device.queue_submit2(queue, submits, fence) }
    }

    unsafe fn cmd_pipeline_barrier2(
        &self,
        cmd: vk::CommandBuffer,
        dependency: &vk::DependencyInfo<'_>,
    ) {
        unsafe { self.device.cmd_pipeline_barrier2(cmd, dependency) }
    }

    unsafe fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &vk::RenderingInfo<'_>) {
        unsafe { self.device.cmd_begin_rendering(cmd, info) }
    }

    unsafe fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) }
    }

    unsafe fn cmd_copy_buffer2(&self, cmd: vk::CommandBuffer, info: &vk::CopyBufferInfo2<'_>) {
        unsafe { self.device.cmd_copy_buffer2(cmd, info) }
    }

    unsafe fn cmd_copy_buffer_to_image2(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CopyBufferToImageInfo2<'_>,
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image2(cmd, info) }
    }

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
        }
    }

    unsafe fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
        }
    }

    unsafe fn surface_present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
        }
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, fence)
        }
    }

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        info: &vk::PresentInfoKHR<'_>,
    ) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(queue, info) }
    }
}

/// Releases Vulkan handles through a shared [`Dispatch`].
pub struct Destroy<D>(Arc<D>);

impl<D> Destroy<D> {
    /// Release strategy that destroys through `dispatch`.
    pub fn new(dispatch: &Arc<D>) -> Self {
        Self(Arc::clone(dispatch))
    }
}

macro_rules! destroy_with {
    ($($handle:ty => $method:ident),* $(,)?) => {
        $(
            impl<D: Dispatch> Release<$handle> for Destroy<D> {
                fn release(&self, value: $handle) {
                    // SAFETY: `Scoped` hands over each non-null handle exactly once.
                    unsafe { self.0.$method(value) }
                }
            }
        )*
    };
}

destroy_with! {
    vk::Fence => destroy_fence,
    vk::Semaphore => destroy_semaphore,
    vk::CommandPool => destroy_command_pool,
    vk::ImageView => destroy_image_view,
    vk::SwapchainKHR => destroy_swapchain,
}

/// A Vulkan handle destroyed through the dispatch table that created it.
pub type Owned<T, D> = Scoped<T, Destroy<D>>;

/// Wrap `handle` so it is destroyed through `dispatch` when dropped.
pub fn owned<T, D>(dispatch: &Arc<D>, handle: T) -> Owned<T, D>
where
    T: Default + PartialEq,
    Destroy<D>: Release<T>,
{
    Scoped::new(handle, Destroy::new(dispatch))
}
