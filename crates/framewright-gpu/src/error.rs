//! Errors raised by the Vulkan layer.
//!
//! Every variant is fatal for whoever receives it. Routine per-frame
//! conditions such as a minimized window or a stale swapchain travel through
//! `Ok` values ([`crate::SwapchainState`], `Option<RenderTarget>`) instead.

use ash::vk;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan call returned a non-success code the caller cannot recover from.
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader library could not be opened.
    #[error("could not load the vulkan library: {0}")]
    Loader(String),

    #[error("no GPU exposes a graphics queue that can present to the surface")]
    NoCompatibleGpu,

    #[error("missing instance or device extension: {0}")]
    MissingExtension(String),

    #[error("gpu-allocator: {0}")]
    Allocation(String),

    #[error("window surface: {0}")]
    Surface(String),

    /// Swapchain negotiation or creation failed, including after the retry.
    #[error("swapchain: {0}")]
    Swapchain(String),

    /// A fence or image acquire did not complete within its timeout.
    #[error("waited {timeout:?} for {what} without a signal")]
    FenceTimeout {
        /// What was being waited on.
        what: &'static str,
        timeout: Duration,
    },

    #[error("shader module: {0}")]
    ShaderModule(String),

    #[error("graphics pipeline: {0}")]
    Pipeline(String),

    /// An operation was called out of order, e.g. drawing with no acquired target.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
