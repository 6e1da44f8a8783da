//! Test doubles for the Framewright frame engine.
//!
//! [`RecordingDispatch`] stands in for the Vulkan function table so the
//! swapchain manager, frame engine and command blocks can be driven without
//! a GPU. [`CountingOverlay`] counts the overlay callbacks the engine makes.

pub mod recording;

pub use recording::{Call, RecordingDispatch, DEFAULT_IMAGE_COUNT};

use std::sync::Arc;

use ash::vk::{self, Handle};
use framewright_gpu::{DebugOverlay, FrameEngine, Gpu, Result, Swapchain};
use glam::IVec2;

/// Window size most tests start from.
pub const WINDOW_SIZE: IVec2 = IVec2::new(1280, 720);

/// Overlay that only counts how often each callback ran.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CountingOverlay {
    pub new_frames: usize,
    pub end_frames: usize,
    pub renders: usize,
}

impl DebugOverlay for CountingOverlay {
    fn new_frame(&mut self) {
        self.new_frames += 1;
    }

    fn end_frame(&mut self) {
        self.end_frames += 1;
    }

    fn render(&mut self, _cmd: vk::CommandBuffer) {
        self.renders += 1;
    }
}

/// A discrete GPU with queue family 0.
pub fn test_gpu() -> Gpu {
    let mut properties = vk::PhysicalDeviceProperties::default();
    properties.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
    properties.api_version = vk::API_VERSION_1_3;

    Gpu {
        physical_device: vk::PhysicalDevice::from_raw(0x1000),
        properties,
        features: vk::PhysicalDeviceFeatures::default(),
        queue_family: 0,
    }
}

pub fn test_surface() -> vk::SurfaceKHR {
    vk::SurfaceKHR::from_raw(0x2000)
}

pub fn test_queue() -> vk::Queue {
    vk::Queue::from_raw(0x3000)
}

/// Swapchain at `size` on the recording table.
pub fn swapchain(dispatch: &Arc<RecordingDispatch>, size: IVec2) -> Result<Swapchain<RecordingDispatch>> {
    // SAFETY: the recording table accepts any handle.
    unsafe {
        Swapchain::new(
            dispatch,
            &test_gpu(),
            test_surface(),
            size,
            vk::PresentModeKHR::FIFO,
        )
    }
}

/// Frame engine over a fresh swapchain at `size`.
pub fn frame_engine(
    dispatch: &Arc<RecordingDispatch>,
    size: IVec2,
) -> Result<FrameEngine<RecordingDispatch, CountingOverlay>> {
    let swapchain = swapchain(dispatch, size)?;
    // SAFETY: the recording table accepts any handle.
    unsafe { FrameEngine::new(dispatch, swapchain, test_queue(), CountingOverlay::default()) }
}
