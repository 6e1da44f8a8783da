//! Descriptor set layouts, pools and single-descriptor writes.
//!
//! Layouts and pools own their handles and destroy them on drop.

use crate::error::Result;
use ash::vk;

/// Collects bindings that each hold exactly one descriptor.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `binding` with a descriptor count of one.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[must_use]
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Creates the layout on `device`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        // SAFETY: caller guarantees the device is valid.
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
        })
    }
}

/// An owned descriptor set layout.
pub struct DescriptorSetLayout {
    device: ash::Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines created with the layout keep their own copy.
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Fixed-capacity pool. Sets are never freed individually, only with the pool.
pub struct DescriptorPool {
    device: ash::Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// `pool_sizes` bounds each descriptor type across all sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        // SAFETY: caller guarantees the device is valid.
        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self {
            device: device.clone(),
            pool,
        })
    }

    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// One set per entry of `layouts`, in order.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        // SAFETY: the pool and device are alive.
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: sets allocated from the pool are freed with it.
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Points `binding` of `dst_set` at a uniform buffer range.
///
/// # Safety
/// Device, set and buffer must be valid, and the set must not be in use by
/// pending GPU work.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer_info: &vk::DescriptorBufferInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(buffer_info));

    // SAFETY: caller guarantees validity.
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Points `binding` of `dst_set` at a sampled image.
///
/// # Safety
/// Device, set, view and sampler must be valid, and the set must not be in
/// use by pending GPU work.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_info: &vk::DescriptorImageInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(image_info));

    // SAFETY: caller guarantees validity.
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_single_descriptor_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);

        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert!(bindings.iter().all(|b| b.descriptor_count == 1));
    }
}
