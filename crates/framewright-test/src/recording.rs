//! A [`Dispatch`] that never touches a driver.
//!
//! Handles are fabricated from a counter, every call is appended to a log,
//! and the results of fence waits, image acquisition and presentation can be
//! scripted per call.

use std::collections::{HashSet, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use framewright_gpu::Dispatch;
use parking_lot::Mutex;

/// Image count reported for new swapchains unless overridden.
pub const DEFAULT_IMAGE_COUNT: u32 = 3;

/// One recorded dispatch call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    DeviceWaitIdle,
    CreateFence { fence: vk::Fence, signaled: bool },
    DestroyFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateCommandPool(vk::CommandPool),
    DestroyCommandPool(vk::CommandPool),
    AllocateCommandBuffers(u32),
    FreeCommandBuffers(usize),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit {
        command_buffers: usize,
        wait_semaphores: usize,
        signal_semaphores: usize,
        fence: vk::Fence,
    },
    PipelineBarrier {
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    BeginRendering(vk::AttachmentLoadOp),
    EndRendering,
    CopyBuffer,
    CopyBufferToImage,
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    SurfaceCapabilities,
    SurfaceFormats,
    SurfacePresentModes,
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        width: u32,
        height: u32,
        min_image_count: u32,
    },
    DestroySwapchain(vk::SwapchainKHR),
    SwapchainImages(vk::SwapchainKHR),
    AcquireNextImage,
    Present { image_index: u32 },
}

#[derive(Default)]
struct Recorder {
    next_handle: u64,
    calls: Vec<Call>,
    signaled_fences: HashSet<vk::Fence>,
    image_count: u32,
    max_image_count: u32,
    next_image: u32,
    surface_extent: Option<vk::Extent2D>,
    surface_formats: Vec<vk::SurfaceFormatKHR>,
    swapchain_error: VecDeque<vk::Result>,
    fence_waits: VecDeque<VkResult<()>>,
    acquires: VecDeque<VkResult<u32>>,
    presents: VecDeque<VkResult<bool>>,
}

impl Recorder {
    fn handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }
}

/// Stub function table recording every call made through it.
///
/// Submissions complete immediately: the fence passed to a submit becomes
/// signaled. Waiting on an unsignaled fence reports `VK_TIMEOUT`, which is
/// how a lost submission shows up.
pub struct RecordingDispatch {
    recorder: Mutex<Recorder>,
}

impl Default for RecordingDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self {
            recorder: Mutex::new(Recorder {
                image_count: DEFAULT_IMAGE_COUNT,
                max_image_count: 8,
                surface_formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                ..Default::default()
            }),
        }
    }

    /// Report a fixed surface extent instead of following the requested
    /// size.
    #[must_use]
    pub fn with_surface_extent(self, width: u32, height: u32) -> Self {
        self.set_surface_extent(width, height);
        self
    }

    /// Change the surface extent reported from now on.
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.recorder.lock().surface_extent = Some(vk::Extent2D { width, height });
    }

    /// Largest image count the surface allows. Zero means unbounded.
    #[must_use]
    pub fn with_max_image_count(self, max: u32) -> Self {
        self.recorder.lock().max_image_count = max;
        self
    }

    /// Number of images every new swapchain gets.
    #[must_use]
    pub fn with_image_count(self, count: u32) -> Self {
        self.recorder.lock().image_count = count;
        self
    }

    /// Formats reported by the surface.
    #[must_use]
    pub fn with_surface_formats(self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.recorder.lock().surface_formats = formats;
        self
    }

    /// Fail the next swapchain creation with `error`.
    pub fn fail_next_swapchain(&self, error: vk::Result) {
        self.recorder.lock().swapchain_error.push_back(error);
    }

    /// Result of the next fence wait, overriding the fence's state.
    pub fn script_fence_wait(&self, result: VkResult<()>) {
        self.recorder.lock().fence_waits.push_back(result);
    }

    /// Result of the next image acquisition. Unscripted acquisitions cycle
    /// through the swapchain's images.
    pub fn script_acquire(&self, result: VkResult<u32>) {
        self.recorder.lock().acquires.push_back(result);
    }

    /// Result of the next present. Unscripted presents succeed.
    pub fn script_present(&self, result: VkResult<bool>) {
        self.recorder.lock().presents.push_back(result);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.recorder.lock().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.recorder.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Forget recorded calls. Fence state and scripts are kept.
    pub fn clear_calls(&self) {
        self.recorder.lock().calls.clear();
    }

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.recorder.lock().signaled_fences.contains(&fence)
    }

    fn record(&self, call: Call) {
        self.recorder.lock().calls.push(call);
    }
}

impl Dispatch for RecordingDispatch {
    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.record(Call::DeviceWaitIdle);
        Ok(())
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let mut recorder = self.recorder.lock();
        let fence: vk::Fence = recorder.handle();
        let signaled = info.flags.contains(vk::FenceCreateFlags::SIGNALED);
        if signaled {
            recorder.signaled_fences.insert(fence);
        }
        recorder.calls.push(Call::CreateFence { fence, signaled });
        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        let mut recorder = self.recorder.lock();
        recorder.signaled_fences.remove(&fence);
        recorder.calls.push(Call::DestroyFence(fence));
    }

    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        _wait_all: bool,
        _timeout_ns: u64,
    ) -> VkResult<()> {
        let mut recorder = self.recorder.lock();
        recorder
            .calls
            .extend(fences.iter().map(|&f| Call::WaitForFence(f)));
        if let Some(result) = recorder.fence_waits.pop_front() {
            return result;
        }
        if fences.iter().all(|f| recorder.signaled_fences.contains(f)) {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut recorder = self.recorder.lock();
        for &fence in fences {
            recorder.signaled_fences.remove(&fence);
            recorder.calls.push(Call::ResetFence(fence));
        }
        Ok(())
    }

    unsafe fn create_semaphore(
        &self,
        _info: &vk::SemaphoreCreateInfo<'_>,
    ) -> VkResult<vk::Semaphore> {
        let mut recorder = self.recorder.lock();
        let semaphore = recorder.handle();
        recorder.calls.push(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore));
    }

    unsafe fn create_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        let mut recorder = self.recorder.lock();
        let pool = recorder.handle();
        recorder.calls.push(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.record(Call::DestroyCommandPool(pool));
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut recorder = self.recorder.lock();
        let count = info.command_buffer_count;
        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| recorder.handle()).collect();
        recorder.calls.push(Call::AllocateCommandBuffers(count));
        Ok(buffers)
    }

    unsafe fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        self.record(Call::FreeCommandBuffers(buffers.len()));
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    unsafe fn queue_submit2(
        &self,
        _queue: vk::Queue,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut recorder = self.recorder.lock();
        for submit in submits {
            recorder.calls.push(Call::Submit {
                command_buffers: submit.command_buffer_info_count as usize,
                wait_semaphores: submit.wait_semaphore_info_count as usize,
                signal_semaphores: submit.signal_semaphore_info_count as usize,
                fence,
            });
        }
        if fence != vk::Fence::null() {
            recorder.signaled_fences.insert(fence);
        }
        Ok(())
    }

    unsafe fn cmd_pipeline_barrier2(
        &self,
        _cmd: vk::CommandBuffer,
        dependency: &vk::DependencyInfo<'_>,
    ) {
        if dependency.image_memory_barrier_count == 0 {
            return;
        }
        // SAFETY: the frame engine builds the info from a live slice.
        let barriers = unsafe {
            std::slice::from_raw_parts(
                dependency.p_image_memory_barriers,
                dependency.image_memory_barrier_count as usize,
            )
        };
        let mut recorder = self.recorder.lock();
        for barrier in barriers {
            recorder.calls.push(Call::PipelineBarrier {
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
            });
        }
    }

    unsafe fn cmd_begin_rendering(&self, _cmd: vk::CommandBuffer, info: &vk::RenderingInfo<'_>) {
        // SAFETY: the info points at one color attachment.
        let load_op = unsafe { (*info.p_color_attachments).load_op };
        self.record(Call::BeginRendering(load_op));
    }

    unsafe fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRendering);
    }

    unsafe fn cmd_copy_buffer2(&self, _cmd: vk::CommandBuffer, _info: &vk::CopyBufferInfo2<'_>) {
        self.record(Call::CopyBuffer);
    }

    unsafe fn cmd_copy_buffer_to_image2(
        &self,
        _cmd: vk::CommandBuffer,
        _info: &vk::CopyBufferToImageInfo2<'_>,
    ) {
        self.record(Call::CopyBufferToImage);
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        let mut recorder = self.recorder.lock();
        let view = recorder.handle();
        recorder.calls.push(Call::CreateImageView(view));
        Ok(view)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyImageView(view));
    }

    unsafe fn surface_capabilities(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut recorder = self.recorder.lock();
        recorder.calls.push(Call::SurfaceCapabilities);
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: recorder.max_image_count,
            current_extent: recorder.surface_extent.unwrap_or(vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }),
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 16_384,
                height: 16_384,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        })
    }

    unsafe fn surface_formats(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let mut recorder = self.recorder.lock();
        recorder.calls.push(Call::SurfaceFormats);
        Ok(recorder.surface_formats.clone())
    }

    unsafe fn surface_present_modes(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        self.record(Call::SurfacePresentModes);
        Ok(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX])
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut recorder = self.recorder.lock();
        if let Some(error) = recorder.swapchain_error.pop_front() {
            return Err(error);
        }
        let swapchain = recorder.handle();
        recorder.next_image = 0;
        recorder.calls.push(Call::CreateSwapchain {
            swapchain,
            width: info.image_extent.width,
            height: info.image_extent.height,
            min_image_count: info.min_image_count,
        });
        Ok(swapchain)
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record(Call::DestroySwapchain(swapchain));
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut recorder = self.recorder.lock();
        recorder.calls.push(Call::SwapchainImages(swapchain));
        let count = recorder.image_count;
        Ok((0..count).map(|_| recorder.handle()).collect())
    }

    unsafe fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _semaphore: vk::Semaphore,
        _fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        let mut recorder = self.recorder.lock();
        recorder.calls.push(Call::AcquireNextImage);
        let index = match recorder.acquires.pop_front() {
            Some(result) => result?,
            None => {
                let index = recorder.next_image;
                recorder.next_image = (index + 1) % recorder.image_count.max(1);
                index
            }
        };
        Ok((index, false))
    }

    unsafe fn queue_present(
        &self,
        _queue: vk::Queue,
        info: &vk::PresentInfoKHR<'_>,
    ) -> VkResult<bool> {
        // SAFETY: the swapchain manager presents exactly one image.
        let image_index = unsafe { *info.p_image_indices };
        let mut recorder = self.recorder.lock();
        recorder.calls.push(Call::Present { image_index });
        recorder.presents.pop_front().unwrap_or(Ok(false))
    }
}
