//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

/// Validation layers requested when validation is enabled.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Keep only the requested layers the loader actually provides.
///
/// Missing layers are logged and skipped rather than failing instance
/// creation.
pub fn filter_available_layers<'a>(
    requested: &[&'a CStr],
    available: &[vk::LayerProperties],
) -> Vec<&'a CStr> {
    requested
        .iter()
        .copied()
        .filter(|layer| {
            let found = available
                .iter()
                .any(|props| props.layer_name_as_c_str() == Ok(*layer));
            if !found {
                tracing::warn!("Vulkan layer {} not available, skipping", layer.to_string_lossy());
            }
            found
        })
        .collect()
}

/// Create a Vulkan 1.3 instance.
///
/// `window_extensions` are the instance extensions the windowing system
/// needs to create a surface.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and every extension pointer
/// must reference a NUL-terminated string.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    window_extensions: &[*const c_char],
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Framewright")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    #[cfg_attr(not(target_os = "macos"), allow(unused_mut))]
    let mut extension_names = window_extensions.to_vec();
    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let layers = if enable_validation {
        // SAFETY: caller guarantees the entry is valid.
        let available = unsafe { entry.enumerate_instance_layer_properties()? };
        filter_available_layers(&validation_layers(), &available)
    } else {
        vec![]
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    // SAFETY: every pointer in `create_info` outlives this call.
    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, &src) in props.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn keeps_available_layers() {
        let available = [layer(c"VK_LAYER_KHRONOS_validation")];
        let kept = filter_available_layers(&validation_layers(), &available);
        assert_eq!(kept, vec![c"VK_LAYER_KHRONOS_validation"]);
    }

    #[test]
    fn skips_missing_layers() {
        let available = [layer(c"VK_LAYER_MESA_overlay")];
        assert!(filter_available_layers(&validation_layers(), &available).is_empty());
    }
}
