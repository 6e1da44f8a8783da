//! Physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;

/// Minimum Vulkan API version a device must report.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_3;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// The selected physical device and the queue family used for everything.
#[derive(Debug, Clone, Copy)]
pub struct Gpu {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    /// Family supporting graphics, transfer and presentation.
    pub queue_family: u32,
}

impl Gpu {
    /// Device name as reported by the driver.
    pub fn name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub const fn vendor(&self) -> GpuVendor {
        GpuVendor::from_vendor_id(self.properties.vendor_id)
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        let api = self.properties.api_version;
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - queue family {}",
            self.name(),
            self.vendor(),
            self.properties.device_type,
            vk::api_version_major(api),
            vk::api_version_minor(api),
            vk::api_version_patch(api),
            self.queue_family,
        )
    }
}

/// What the selector needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub device: T,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub supports_swapchain: bool,
    /// First family supporting both graphics and transfer.
    pub queue_family: Option<u32>,
    /// Whether `queue_family` can present to the target surface.
    pub can_present: bool,
}

impl<T> Candidate<T> {
    /// Whether every capability predicate holds.
    pub fn is_suitable(&self) -> bool {
        self.api_version >= MIN_API_VERSION
            && self.supports_swapchain
            && self.queue_family.is_some()
            && self.can_present
    }
}

/// Pick a device: the first suitable discrete GPU, otherwise the first
/// suitable device of any other type.
pub fn pick_suitable<T>(candidates: impl IntoIterator<Item = Candidate<T>>) -> Option<Candidate<T>> {
    let mut fallback = None;
    for candidate in candidates {
        if !candidate.is_suitable() {
            continue;
        }
        if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Some(candidate);
        }
        if fallback.is_none() {
            fallback = Some(candidate);
        }
    }
    fallback
}

/// Index of the first queue family supporting both graphics and transfer.
pub fn find_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    let wanted = vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER;
    families
        .iter()
        .position(|family| family.queue_flags.contains(wanted))
        .and_then(|index| u32::try_from(index).ok())
}

/// Select a GPU able to render and present to `surface`.
///
/// # Safety
/// The instance, surface loader and surface must be valid.
pub unsafe fn select_gpu(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<Gpu> {
    // SAFETY: caller guarantees the instance is valid.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let candidates = devices.into_iter().map(|device| {
        // SAFETY: `device` was just enumerated from `instance`.
        unsafe { describe(instance, surface_loader, surface, device) }
    });

    let chosen = pick_suitable(candidates).ok_or(GpuError::NoCompatibleGpu)?;
    let queue_family = chosen.queue_family.ok_or(GpuError::NoCompatibleGpu)?;

    // SAFETY: `chosen.device` is a valid physical device of `instance`.
    let (properties, features) = unsafe {
        (
            instance.get_physical_device_properties(chosen.device),
            instance.get_physical_device_features(chosen.device),
        )
    };

    Ok(Gpu {
        physical_device: chosen.device,
        properties,
        features,
        queue_family,
    })
}

/// Query the capability predicates of one device.
unsafe fn describe(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Candidate<vk::PhysicalDevice> {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    let supports_swapchain = unsafe { instance.enumerate_device_extension_properties(device) }
        .unwrap_or_default()
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_family = find_queue_family(&families);

    let can_present = queue_family.is_some_and(|family| {
        unsafe { surface_loader.get_physical_device_surface_support(device, family, surface) }
            .unwrap_or(false)
    });

    Candidate {
        device,
        device_type: properties.device_type,
        api_version: properties.api_version,
        supports_swapchain,
        queue_family,
        can_present,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, device_type: vk::PhysicalDeviceType) -> Candidate<u32> {
        Candidate {
            device: id,
            device_type,
            api_version: vk::API_VERSION_1_3,
            supports_swapchain: true,
            queue_family: Some(0),
            can_present: true,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn prefers_discrete_gpu() {
        let picked = pick_suitable([
            candidate(1, vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate(3, vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        assert_eq!(picked.map(|c| c.device), Some(2));
    }

    #[test]
    fn falls_back_to_first_suitable_device() {
        let picked = pick_suitable([
            candidate(1, vk::PhysicalDeviceType::CPU),
            candidate(2, vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        assert_eq!(picked.map(|c| c.device), Some(1));
    }

    #[test]
    fn rejects_old_api_versions() {
        let mut old = candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU);
        old.api_version = vk::API_VERSION_1_2;
        let picked = pick_suitable([old, candidate(2, vk::PhysicalDeviceType::INTEGRATED_GPU)]);
        assert_eq!(picked.map(|c| c.device), Some(2));
    }

    #[test]
    fn rejects_devices_missing_capabilities() {
        let mut no_swapchain = candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.supports_swapchain = false;
        let mut no_queue = candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU);
        no_queue.queue_family = None;
        let mut no_present = candidate(3, vk::PhysicalDeviceType::DISCRETE_GPU);
        no_present.can_present = false;

        assert!(pick_suitable([no_swapchain, no_queue, no_present]).is_none());
    }

    #[test]
    fn queue_family_needs_graphics_and_transfer() {
        let family = |flags| vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        };
        let families = [
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(find_queue_family(&families), Some(2));
        assert_eq!(find_queue_family(&families[..2]), None);
    }
}
