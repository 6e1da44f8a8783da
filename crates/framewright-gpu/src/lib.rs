//! Vulkan side of Framewright: device selection, swapchain, frame pacing.
//!
//! Every Vulkan call made by the swapchain, the command blocks and the
//! [`FrameEngine`] goes through a [`Dispatch`] table, so the frame lifecycle
//! can run against a recording stub in tests. [`VulkanDispatch`] forwards to
//! a real `ash::Device`.
//!
//! Resource helpers (allocator, textures, descriptors, [`ShaderProgram`]) use
//! `ash::Device` directly.

pub mod command;
pub mod context;
pub mod descriptors;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod instance;
pub mod memory;
pub mod overlay;
pub mod pipeline;
pub mod scoped;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use command::{CommandBlock, CommandPool, COMMAND_BLOCK_TIMEOUT};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use dispatch::{owned, Dispatch, Owned, VulkanDispatch};
pub use error::{GpuError, Result};
pub use frame::{DrawContext, FrameEngine, DEFAULT_CLEAR_COLOR};
pub use gpu::{Gpu, GpuVendor};
pub use memory::{Bitmap, Buffer, DescriptorBuffer, GpuAllocator, Image, MemoryType};
pub use overlay::DebugOverlay;
pub use pipeline::{ShaderProgram, ShaderProgramCreateInfo, ShaderProgramFlags, ShaderVertexInput};
pub use scoped::{Release, Scoped};
pub use swapchain::{RenderTarget, Swapchain, SwapchainState, MIN_SWAPCHAIN_IMAGES};
pub use sync::{Buffered, RenderSync, FRAMES_IN_FLIGHT, RENDER_FENCE_TIMEOUT};
pub use texture::Texture;

pub use ash;
