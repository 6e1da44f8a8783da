//! Swapchain management.

use crate::dispatch::{owned, Dispatch, Owned};
use crate::error::{GpuError, Result};
use crate::gpu::Gpu;
use crate::sync::{timeout_ns, RENDER_FENCE_TIMEOUT};
use ash::vk;
use glam::IVec2;
use std::sync::Arc;

/// Minimum number of swapchain images requested.
pub const MIN_SWAPCHAIN_IMAGES: u32 = 3;

/// sRGB formats in order of preference.
const SRGB_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

/// Color image with one layer and one mip level.
const COLOR_SUBRESOURCE_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// An acquired swapchain image, valid until the next present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub image_view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Where the swapchain is in its acquire/present cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// An image may be acquired.
    Ready,
    /// An image is acquired and not yet presented.
    Acquired,
    /// The surface reported out-of-date; `recreate` is required.
    Stale,
}

/// Negotiated swapchain parameters.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    pub surface: vk::SurfaceKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub present_mode: vk::PresentModeKHR,
    pub queue_family: u32,
}

/// Presentable images negotiated with a window surface.
pub struct Swapchain<D: Dispatch> {
    dispatch: Arc<D>,
    descriptor: SwapchainDescriptor,
    // Views drop before the swapchain that owns their images.
    image_views: Vec<Owned<vk::ImageView, D>>,
    swapchain: Owned<vk::SwapchainKHR, D>,
    images: Vec<vk::Image>,
    image_index: Option<u32>,
    stale: bool,
}

impl<D: Dispatch> std::fmt::Debug for Swapchain<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("descriptor", &self.descriptor)
            .field("images", &self.images)
            .field("image_index", &self.image_index)
            .field("stale", &self.stale)
            .finish_non_exhaustive()
    }
}

impl<D: Dispatch> Swapchain<D> {
    /// Negotiate a swapchain for `surface` at `size`.
    ///
    /// Picks an sRGB format and `present_mode` if supported (FIFO otherwise).
    /// A failed creation is retried once before giving up.
    ///
    /// # Safety
    /// The dispatch table, `gpu` and `surface` must be valid and belong
    /// together.
    pub unsafe fn new(
        dispatch: &Arc<D>,
        gpu: &Gpu,
        surface: vk::SurfaceKHR,
        size: IVec2,
        present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        // SAFETY: caller guarantees the surface is valid.
        let (formats, present_modes) = unsafe {
            (
                dispatch.surface_formats(surface)?,
                dispatch.surface_present_modes(surface)?,
            )
        };
        let surface_format = select_surface_format(&formats).ok_or_else(|| {
            GpuError::Swapchain("Surface reports no formats".to_string())
        })?;

        let mut swapchain = Self {
            dispatch: Arc::clone(dispatch),
            descriptor: SwapchainDescriptor {
                surface,
                format: surface_format.format,
                color_space: surface_format.color_space,
                extent: vk::Extent2D::default(),
                min_image_count: MIN_SWAPCHAIN_IMAGES,
                present_mode: select_present_mode(&present_modes, present_mode),
                queue_family: gpu.queue_family,
            },
            image_views: Vec::new(),
            swapchain: owned(dispatch, vk::SwapchainKHR::null()),
            images: Vec::new(),
            image_index: None,
            stale: false,
        };

        let created = match swapchain.recreate(size) {
            Err(first) => {
                tracing::warn!("Swapchain creation failed ({first}), retrying");
                swapchain.recreate(size).map_err(|second| {
                    GpuError::Swapchain(format!("failed twice: {first}; {second}"))
                })?
            }
            Ok(created) => created,
        };

        if !created {
            return Err(GpuError::Swapchain(format!(
                "no drawable extent for {}x{}",
                size.x, size.y
            )));
        }

        Ok(swapchain)
    }

    /// Rebuild the swapchain for `size`.
    ///
    /// Returns `Ok(false)` and leaves everything untouched when either
    /// dimension of `size`, or of the extent the surface reports, is not
    /// positive. Waits for the device to go idle before
    /// releasing the previous swapchain and its views.
    pub fn recreate(&mut self, size: IVec2) -> Result<bool> {
        // Image sizes must be positive.
        let (Ok(width), Ok(height)) = (u32::try_from(size.x), u32::try_from(size.y)) else {
            return Ok(false);
        };
        if width == 0 || height == 0 {
            return Ok(false);
        }

        // SAFETY: the surface is valid for the lifetime of the swapchain.
        let capabilities = unsafe { self.dispatch.surface_capabilities(self.descriptor.surface)? };
        let extent = image_extent(&capabilities, width, height);
        // Minimized surfaces may report a defined 0x0 extent.
        if extent.width == 0 || extent.height == 0 {
            return Ok(false);
        }
        let min_image_count = image_count(&capabilities);

        let queue_families = [self.descriptor.queue_family];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.descriptor.surface)
            .min_image_count(min_image_count)
            .image_format(self.descriptor.format)
            .image_color_space(self.descriptor.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // Swapchain images are only used as render targets.
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.descriptor.present_mode)
            .clipped(true)
            .old_swapchain(*self.swapchain);

        // SAFETY: no GPU work may still reference the old images once idle.
        let new_swapchain = unsafe {
            self.dispatch.device_wait_idle()?;
            self.dispatch
                .create_swapchain(&create_info)
                .map_err(|e| GpuError::Swapchain(e.to_string()))?
        };

        self.image_views.clear();
        self.swapchain.replace(new_swapchain);
        self.image_index = None;
        self.stale = false;
        self.descriptor.extent = extent;
        self.descriptor.min_image_count = min_image_count;

        // SAFETY: the swapchain was just created.
        self.images = unsafe { self.dispatch.swapchain_images(new_swapchain)? };
        self.create_image_views()?;

        tracing::info!(
            "Swapchain [{}x{}] ({} images)",
            extent.width,
            extent.height,
            self.images.len()
        );

        Ok(true)
    }

    fn create_image_views(&mut self) -> Result<()> {
        let mut view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.descriptor.format)
            .subresource_range(COLOR_SUBRESOURCE_RANGE);

        self.image_views.reserve(self.images.len());
        for &image in &self.images {
            view_info = view_info.image(image);
            // SAFETY: `image` belongs to the live swapchain.
            let view = unsafe { self.dispatch.create_image_view(&view_info)? };
            self.image_views.push(owned(&self.dispatch, view));
        }
        Ok(())
    }

    /// Acquire the next presentable image, signaling `to_signal` when it is
    /// ready to be drawn to.
    ///
    /// Returns `Ok(None)` when the surface is out of date; the swapchain is
    /// then [`SwapchainState::Stale`] and further acquires return `Ok(None)`
    /// without calling the driver until [`recreate`](Self::recreate)
    /// succeeds.
    ///
    /// # Panics
    /// If an image is already acquired.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(&mut self, to_signal: vk::Semaphore) -> Result<Option<RenderTarget>> {
        assert!(
            self.image_index.is_none(),
            "acquire_next_image called while an image is still acquired"
        );
        if self.stale {
            return Ok(None);
        }

        // SAFETY: swapchain and semaphore are valid.
        let result = unsafe {
            self.dispatch.acquire_next_image(
                *self.swapchain,
                timeout_ns(RENDER_FENCE_TIMEOUT),
                to_signal,
                vk::Fence::null(),
            )
        };

        let index = match result {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.stale = true;
                return Ok(None);
            }
            Err(vk::Result::TIMEOUT) => {
                return Err(GpuError::FenceTimeout {
                    what: "swapchain image",
                    timeout: RENDER_FENCE_TIMEOUT,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let slot = index as usize;
        let (Some(&image), Some(view)) = (self.images.get(slot), self.image_views.get(slot)) else {
            return Err(GpuError::InvalidState(format!(
                "Acquired image index {index} out of range"
            )));
        };

        self.image_index = Some(index);
        Ok(Some(RenderTarget {
            image,
            image_view: **view,
            extent: self.descriptor.extent,
        }))
    }

    /// Barrier template for the acquired image: color subresource, owned by
    /// the swapchain's queue family on both sides.
    pub fn base_barrier(&self) -> Option<vk::ImageMemoryBarrier2<'static>> {
        let image = *self.images.get(self.image_index? as usize)?;
        Some(
            vk::ImageMemoryBarrier2::default()
                .image(image)
                .subresource_range(COLOR_SUBRESOURCE_RANGE)
                .src_queue_family_index(self.descriptor.queue_family)
                .dst_queue_family_index(self.descriptor.queue_family),
        )
    }

    /// Present the acquired image once `to_wait` is signaled.
    ///
    /// The acquired index is cleared whatever the outcome. Returns
    /// `Ok(false)` when the surface needs recreation.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&mut self, queue: vk::Queue, to_wait: vk::Semaphore) -> Result<bool> {
        let index = self
            .image_index
            .take()
            .ok_or_else(|| GpuError::InvalidState("present without an acquired image".to_string()))?;

        let swapchains = [*self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [to_wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: all handles are valid and the image was acquired.
        match unsafe { self.dispatch.queue_present(queue, &present_info) } {
            Ok(_suboptimal) => Ok(true),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.stale = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current image size.
    pub fn size(&self) -> IVec2 {
        let extent = self.descriptor.extent;
        IVec2::new(
            i32::try_from(extent.width).unwrap_or(i32::MAX),
            i32::try_from(extent.height).unwrap_or(i32::MAX),
        )
    }

    pub const fn format(&self) -> vk::Format {
        self.descriptor.format
    }

    pub const fn descriptor(&self) -> &SwapchainDescriptor {
        &self.descriptor
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.image_views.iter().map(|view| **view)
    }

    pub const fn state(&self) -> SwapchainState {
        if self.image_index.is_some() {
            SwapchainState::Acquired
        } else if self.stale {
            SwapchainState::Stale
        } else {
            SwapchainState::Ready
        }
    }
}

/// Pick R8G8B8A8_SRGB, then B8G8R8A8_SRGB, in the sRGB non-linear color
/// space; otherwise whatever the surface lists first.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    SRGB_FORMATS
        .iter()
        .find_map(|&desired| {
            available.iter().copied().find(|format| {
                format.format == desired && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| available.first().copied())
}

/// Use `preferred` if the surface supports it; FIFO is always available.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent if defined, else `width`×`height` clamped
/// to the supported range.
pub fn image_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width != u32::MAX && current.height != u32::MAX {
        return current;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// [`MIN_SWAPCHAIN_IMAGES`] clamped to the surface's range. A maximum of 0
/// means unbounded.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if capabilities.max_image_count < capabilities.min_image_count {
        return MIN_SWAPCHAIN_IMAGES.max(capabilities.min_image_count);
    }
    MIN_SWAPCHAIN_IMAGES.clamp(capabilities.min_image_count, capabilities.max_image_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_rgba_srgb() {
        let available = [
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
    }

    #[test]
    fn srgb_format_needs_srgb_color_space() {
        let available = [
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [surface_format(
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::A2B10G10R10_UNORM_PACK32)
        );
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn uses_current_extent_when_defined() {
        let mut caps = capabilities(2, 8);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(image_extent(&caps, 1280, 720), caps.current_extent);
    }

    #[test]
    fn clamps_requested_extent() {
        let caps = capabilities(2, 8);
        assert_eq!(
            image_extent(&caps, 8000, 720),
            vk::Extent2D {
                width: 4096,
                height: 720
            }
        );
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(image_count(&capabilities(2, 8)), 3);
        assert_eq!(image_count(&capabilities(4, 8)), 4);
        assert_eq!(image_count(&capabilities(1, 2)), 2);
    }

    #[test]
    fn image_count_with_unbounded_maximum() {
        assert_eq!(image_count(&capabilities(2, 0)), 3);
        assert_eq!(image_count(&capabilities(5, 0)), 5);
    }
}
