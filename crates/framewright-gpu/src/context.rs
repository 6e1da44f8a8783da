//! GPU context management.

use crate::dispatch::VulkanDispatch;
use crate::error::{GpuError, Result};
use crate::gpu::{select_gpu, Gpu};
use crate::instance::create_instance;
use crate::memory::GpuAllocator;
use crate::surface::{create_surface, required_extensions};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

/// Instance, surface, device and allocator for one window.
///
/// Everything created from the context (swapchains, frame engines, buffers,
/// pipelines) must be dropped before it.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    surface: vk::SurfaceKHR,
    gpu: Gpu,
    dispatch: Arc<VulkanDispatch>,
    queue: vk::Queue,
    allocator: GpuAllocator,
    enabled_features: vk::PhysicalDeviceFeatures,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        self.dispatch.device()
    }

    /// The function table shared with the frame engine.
    pub const fn dispatch(&self) -> &Arc<VulkanDispatch> {
        &self.dispatch
    }

    /// The selected physical device.
    pub const fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// The window surface.
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// The graphics/transfer/present queue.
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Queue family of [`Self::queue`].
    pub const fn queue_family(&self) -> u32 {
        self.gpu.queue_family
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    /// Optional device features that were enabled.
    pub const fn enabled_features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.enabled_features
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is alive for the lifetime of the context.
        unsafe {
            self.device().device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: all child objects are required to be dropped already.
        unsafe {
            let _ = self.device().device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            self.allocator.shutdown();

            self.device().destroy_device(None);
            self.dispatch
                .surface_loader()
                .destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Framewright".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context for `window`.
    ///
    /// # Safety
    /// The window must outlive the returned context.
    pub unsafe fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        // SAFETY: loading the system Vulkan library.
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Loader(e.to_string()))?;

        let extensions = required_extensions(window)?;
        // SAFETY: the extension list comes from ash-window.
        let instance =
            unsafe { create_instance(&entry, &self.app_name, self.enable_validation, extensions)? };

        // SAFETY: instance was created with the window's surface extensions.
        let surface = match unsafe { create_surface(&entry, &instance, window) } {
            Ok(surface) => surface,
            Err(e) => {
                // SAFETY: nothing else was created from the instance yet.
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        // SAFETY: instance, loader and surface are valid.
        let selected = unsafe { select_gpu(&instance, &surface_loader, surface) }
            .and_then(|gpu| {
                // SAFETY: the GPU was enumerated from this instance.
                let (device, features) = unsafe { create_device(&instance, &gpu)? };
                Ok((gpu, device, features))
            });
        let (gpu, device, enabled_features) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                // SAFETY: surface and instance have no other children.
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        tracing::info!("Selected GPU: {}", gpu.summary());

        // SAFETY: the queue family was requested at device creation.
        let queue = unsafe { device.get_device_queue(gpu.queue_family, 0) };

        // SAFETY: instance, device and physical device are valid.
        let allocator =
            unsafe { GpuAllocator::new(&instance, device.clone(), gpu.physical_device)? };

        let dispatch = Arc::new(VulkanDispatch::new(
            &entry,
            &instance,
            gpu.physical_device,
            device,
        ));

        Ok(GpuContext {
            entry,
            instance,
            surface,
            gpu,
            dispatch,
            queue,
            allocator,
            enabled_features,
        })
    }
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Optional features turned on when the device supports them.
pub fn optional_features(supported: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
        .wide_lines(supported.wide_lines == vk::TRUE)
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
        .sample_rate_shading(supported.sample_rate_shading == vk::TRUE)
}

/// Create the logical device with a single queue.
///
/// # Safety
/// The instance must be valid and `gpu` must come from it.
unsafe fn create_device(
    instance: &ash::Instance,
    gpu: &Gpu,
) -> Result<(ash::Device, vk::PhysicalDeviceFeatures)> {
    let queue_priority = 1.0_f32;
    let queue_create_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(gpu.queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let extension_names: Vec<_> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    // Enable Vulkan 1.3 features
    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let enabled_features = optional_features(&gpu.features);

    // Chain features together
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(enabled_features)
        .push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    // SAFETY: caller guarantees instance and physical device are valid.
    let device = unsafe {
        instance
            .create_device(gpu.physical_device, &device_create_info, None)
            .map_err(GpuError::from)?
    };

    Ok((device, enabled_features))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_features_follow_support() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(true)
            .sampler_anisotropy(true)
            .geometry_shader(true);

        let enabled = optional_features(&supported);
        assert_eq!(enabled.fill_mode_non_solid, vk::TRUE);
        assert_eq!(enabled.sampler_anisotropy, vk::TRUE);
        assert_eq!(enabled.wide_lines, vk::FALSE);
        assert_eq!(enabled.sample_rate_shading, vk::FALSE);
        assert_eq!(enabled.geometry_shader, vk::FALSE);
    }
}
