//! Sampled 2D textures.

use crate::command::CommandBlock;
use crate::dispatch::Dispatch;
use crate::error::Result;
use crate::memory::{Bitmap, GpuAllocator, Image};
use ash::vk;

/// Sampler with the same address mode on every axis and one filter for
/// minification and magnification.
pub fn sampler_info(
    wrap: vk::SamplerAddressMode,
    filter: vk::Filter,
) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .address_mode_u(wrap)
        .address_mode_v(wrap)
        .address_mode_w(wrap)
        .min_filter(filter)
        .mag_filter(filter)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
}

/// Clamp to edge, linear filtering.
pub fn default_sampler_info() -> vk::SamplerCreateInfo<'static> {
    sampler_info(vk::SamplerAddressMode::CLAMP_TO_EDGE, vk::Filter::LINEAR)
}

/// An uploaded image with its view and sampler.
pub struct Texture {
    device: ash::Device,
    sampler: vk::Sampler,
    view: vk::ImageView,
    image: Image,
}

impl Texture {
    /// Upload `bitmap` through `block`. An empty or zero-sized bitmap is
    /// replaced by a single white pixel.
    ///
    /// # Safety
    /// The device must be the allocator's device and be valid.
    pub unsafe fn new<D: Dispatch>(
        allocator: &GpuAllocator,
        block: CommandBlock<D>,
        bitmap: Bitmap<'_>,
        sampler: &vk::SamplerCreateInfo<'_>,
    ) -> Result<Self> {
        let bitmap = if bitmap.bytes.is_empty() || bitmap.width == 0 || bitmap.height == 0 {
            Bitmap::white()
        } else {
            bitmap
        };

        let image = allocator.create_sampled_image(block, &bitmap)?;
        let device = allocator.device().clone();

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        // SAFETY: the image was just created on this device.
        let view = unsafe { device.create_image_view(&view_info, None)? };

        // SAFETY: caller guarantees the device is valid.
        let sampler = match unsafe { device.create_sampler(sampler, None) } {
            Ok(sampler) => sampler,
            Err(e) => {
                // SAFETY: the view is unused.
                unsafe { device.destroy_image_view(view, None) };
                return Err(e.into());
            }
        };

        Ok(Self {
            device,
            sampler,
            view,
            image,
        })
    }

    /// Descriptor for a combined image sampler binding.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // SAFETY: the caller keeps textures alive while frames referencing
        // them are in flight.
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sampler_clamps_and_filters_linearly() {
        let info = default_sampler_info();
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.max_lod, vk::LOD_CLAMP_NONE);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
    }

    #[test]
    fn sampler_info_uses_filter_for_both_directions() {
        let info = sampler_info(vk::SamplerAddressMode::REPEAT, vk::Filter::NEAREST);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.min_filter, vk::Filter::NEAREST);
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
    }
}
