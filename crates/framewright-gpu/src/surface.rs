//! Surface creation for windowed rendering.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::c_char;

/// Instance extensions the window's display needs for surface creation.
pub fn required_extensions<W>(window: &W) -> Result<&'static [*const c_char]>
where
    W: HasDisplayHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::Surface(format!("Failed to get display handle: {e}")))?;

    ash_window::enumerate_required_extensions(display.as_raw())
        .map_err(|e| GpuError::MissingExtension(e.to_string()))
}

/// Create a Vulkan surface for `window`.
///
/// # Safety
/// The entry and instance must be valid, the instance must have been created
/// with [`required_extensions`], and the window must outlive the surface.
pub unsafe fn create_surface<W>(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &W,
) -> Result<vk::SurfaceKHR>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::Surface(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::Surface(format!("Failed to get window handle: {e}")))?;

    // SAFETY: caller guarantees entry, instance and window are valid.
    unsafe {
        ash_window::create_surface(
            entry,
            instance,
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
    }
    .map_err(|e| GpuError::Surface(e.to_string()))
}
