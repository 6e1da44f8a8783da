//! GPU memory management.

use crate::command::CommandBlock;
use crate::dispatch::Dispatch;
use crate::error::{GpuError, Result};
use crate::scoped::{Release, Scoped};
use crate::sync::{Buffered, FRAMES_IN_FLIGHT};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// Format of sampled images uploaded from 8-bit RGBA bitmaps.
pub const SAMPLED_IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Host visible and persistently mapped.
    Host,
    /// Device local; filled through a staging copy.
    Device,
}

impl MemoryType {
    const fn location(self) -> MemoryLocation {
        match self {
            Self::Host => MemoryLocation::CpuToGpu,
            Self::Device => MemoryLocation::GpuOnly,
        }
    }
}

/// GPU memory allocator shared by every buffer and image it creates.
///
/// Cloning is cheap; clones share one `gpu_allocator` instance.
#[derive(Clone)]
pub struct GpuAllocator {
    device: ash::Device,
    inner: Arc<Mutex<Option<Allocator>>>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::Allocation(e.to_string()))?;

        Ok(Self {
            device,
            inner: Arc::new(Mutex::new(Some(allocator))),
        })
    }

    /// The device memory is allocated from.
    pub const fn device(&self) -> &ash::Device {
        &self.device
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.inner
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::Allocation(e.to_string()))
    }

    fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.inner.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free allocation: {e}");
            }
        }
    }

    /// Create a buffer of `size` bytes.
    ///
    /// Device buffers can additionally be copied into. Host buffers are
    /// mapped for their whole lifetime. A zero size or a failed creation is
    /// logged and yields an empty buffer.
    pub fn create_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        memory_type: MemoryType,
        size: u64,
    ) -> Buffer {
        if size == 0 {
            tracing::error!("Buffer cannot be 0-sized");
            return Buffer::empty(self);
        }

        let usage = match memory_type {
            MemoryType::Device => usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryType::Host => usage,
        };

        match self.try_create_buffer(usage, memory_type, size) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::error!("Failed to create {size}-byte buffer: {e}");
                Buffer::empty(self)
            }
        }
    }

    fn try_create_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        memory_type: MemoryType,
        size: u64,
    ) -> Result<Buffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: the device is valid for the allocator's lifetime.
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        // SAFETY: `buffer` was just created.
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate("buffer", requirements, memory_type.location(), true)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: nothing references the unbound buffer.
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let scoped = Scoped::new(
            RawBuffer {
                buffer,
                allocation: Some(allocation),
                size,
            },
            self.clone(),
        );

        if let Some(allocation) = &scoped.allocation {
            // SAFETY: the allocation satisfies the buffer's requirements.
            unsafe {
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
            }
        }

        Ok(Buffer(scoped))
    }

    /// Create a device-local buffer holding `spans` back to back.
    ///
    /// The data goes through a host staging buffer and is copied on the
    /// GPU by `block`, which is submitted and waited on. Yields an empty
    /// buffer if either buffer could not be created.
    pub fn create_device_buffer<D: Dispatch>(
        &self,
        usage: vk::BufferUsageFlags,
        block: CommandBlock<D>,
        spans: &[&[u8]],
    ) -> Result<Buffer> {
        let (offsets, total) = span_offsets(spans);

        let mut staging =
            self.create_buffer(vk::BufferUsageFlags::TRANSFER_SRC, MemoryType::Host, total);
        let buffer = self.create_buffer(usage, MemoryType::Device, total);
        if staging.is_empty() || buffer.is_empty() {
            return Ok(Buffer::empty(self));
        }

        for (span, offset) in spans.iter().zip(offsets) {
            staging.write_bytes(offset, span)?;
        }

        let region = vk::BufferCopy2::default().size(total);
        let copy_info = vk::CopyBufferInfo2::default()
            .src_buffer(staging.handle())
            .dst_buffer(buffer.handle())
            .regions(std::slice::from_ref(&region));
        // SAFETY: the block is recording and both buffers are at least `total` bytes.
        unsafe {
            block
                .dispatch()
                .cmd_copy_buffer2(block.command_buffer(), &copy_info);
        }

        block.submit_and_wait()?;
        drop(staging);

        Ok(buffer)
    }

    /// Upload `bitmap` into a sampled image in shader-read layout.
    pub fn create_sampled_image<D: Dispatch>(
        &self,
        block: CommandBlock<D>,
        bitmap: &Bitmap<'_>,
    ) -> Result<Image> {
        if !bitmap.is_valid() {
            return Err(GpuError::InvalidState(format!(
                "Bitmap {}x{} does not match its {} bytes",
                bitmap.width,
                bitmap.height,
                bitmap.bytes.len()
            )));
        }

        let mut staging = self.create_buffer(
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryType::Host,
            bitmap.bytes.len() as u64,
        );
        if staging.is_empty() {
            return Err(GpuError::Allocation(
                "Staging buffer for image upload".to_string(),
            ));
        }
        staging.write_bytes(0, bitmap.bytes)?;

        let extent = vk::Extent3D {
            width: bitmap.width,
            height: bitmap.height,
            depth: 1,
        };
        let image = self.create_image(
            &vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(SAMPLED_IMAGE_FORMAT)
                .extent(extent)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED),
        )?;

        let cmd = block.command_buffer();
        let dispatch = block.dispatch();
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);

        let to_transfer = vk::ImageMemoryBarrier2::default()
            .image(image.handle())
            .subresource_range(range)
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::COPY)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let region = vk::BufferImageCopy2::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(extent);
        let copy_info = vk::CopyBufferToImageInfo2::default()
            .src_buffer(staging.handle())
            .dst_image(image.handle())
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region));

        let to_shader_read = vk::ImageMemoryBarrier2::default()
            .image(image.handle())
            .subresource_range(range)
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags2::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // SAFETY: the block is recording; staging and image are alive until
        // the submission completes.
        unsafe {
            dispatch.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_transfer)),
            );
            dispatch.cmd_copy_buffer_to_image2(cmd, &copy_info);
            dispatch.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_shader_read)),
            );
        }

        block.submit_and_wait()?;
        drop(staging);

        Ok(image)
    }

    /// Allocate a device-local image.
    pub fn create_image(&self, create_info: &vk::ImageCreateInfo<'_>) -> Result<Image> {
        // SAFETY: the device is valid for the allocator's lifetime.
        let image = unsafe { self.device.create_image(create_info, None)? };
        // SAFETY: `image` was just created.
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate("image", requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: nothing references the unbound image.
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let raw = RawImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        };
        // Release from here on frees both the allocation and the image.
        let scoped = Scoped::new(raw, self.clone());

        if let Some(allocation) = &scoped.allocation {
            // SAFETY: the allocation satisfies the image's requirements.
            unsafe {
                self.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())?;
            }
        }

        Ok(Image(scoped))
    }

    /// Free all GPU memory. Must run before the device is destroyed;
    /// allocations still alive are reported as leaks.
    pub fn shutdown(&self) {
        if let Some(allocator) = self.inner.lock().take() {
            drop(allocator);
        }
    }
}

/// Byte offset of every span when laid out back to back, and the total.
pub fn span_offsets(spans: &[&[u8]]) -> (Vec<u64>, u64) {
    let mut total = 0_u64;
    let offsets = spans
        .iter()
        .map(|span| {
            let offset = total;
            total += span.len() as u64;
            offset
        })
        .collect();
    (offsets, total)
}

/// A buffer handle with its allocation.
#[derive(Default)]
pub struct RawBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl PartialEq for RawBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer && self.size == other.size
    }
}

impl Release<RawBuffer> for GpuAllocator {
    fn release(&self, mut value: RawBuffer) {
        if let Some(allocation) = value.allocation.take() {
            self.free(allocation);
        }
        // SAFETY: the buffer is owned by exactly one `Buffer`.
        unsafe { self.device.destroy_buffer(value.buffer, None) };
    }
}

/// An owned GPU buffer. Empty when creation failed.
pub struct Buffer(Scoped<RawBuffer, GpuAllocator>);

impl Buffer {
    /// A buffer that owns nothing.
    pub fn empty(allocator: &GpuAllocator) -> Self {
        Self(Scoped::new(RawBuffer::default(), allocator.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    pub fn handle(&self) -> vk::Buffer {
        self.0.buffer
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.0.size
    }

    /// Mapped contents of a host buffer.
    pub fn mapped_slice(&self) -> Option<&[u8]> {
        self.0.allocation.as_ref()?.mapped_slice()
    }

    /// Write raw bytes at `offset` (host buffers only).
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let size = self.size();
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "Write of {} bytes at {offset} exceeds {size}-byte buffer",
                    data.len()
                ))
            })?;

        let mapped = self
            .0
            .project_mut(|raw| &mut raw.allocation)
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let start = usize::try_from(offset).map_err(|e| GpuError::Other(e.to_string()))?;
        let end = usize::try_from(end).map_err(|e| GpuError::Other(e.to_string()))?;
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Write typed data at `offset` (host buffers only).
    pub fn write<T: Pod>(&mut self, offset: u64, data: &[T]) -> Result<()> {
        self.write_bytes(offset, bytemuck::cast_slice(data))
    }
}

/// An image handle with its allocation.
#[derive(Default)]
pub struct RawImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl PartialEq for RawImage {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
    }
}

impl Release<RawImage> for GpuAllocator {
    fn release(&self, mut value: RawImage) {
        if let Some(allocation) = value.allocation.take() {
            self.free(allocation);
        }
        // SAFETY: the image is owned by exactly one `Image`.
        unsafe { self.device.destroy_image(value.image, None) };
    }
}

/// An owned device-local image.
pub struct Image(Scoped<RawImage, GpuAllocator>);

impl Image {
    pub fn handle(&self) -> vk::Image {
        self.0.image
    }

    pub fn format(&self) -> vk::Format {
        self.0.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.0.extent
    }
}

/// Tightly packed 8-bit RGBA pixels.
#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'a> {
    pub bytes: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl Bitmap<'static> {
    /// A single opaque white pixel.
    pub const fn white() -> Self {
        Self {
            bytes: &[0xFF; 4],
            width: 1,
            height: 1,
        }
    }
}

impl Bitmap<'_> {
    /// Non-empty, positive size, and exactly `width * height * 4` bytes.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && !self.bytes.is_empty()
            && u64::from(self.width) * u64::from(self.height) * 4 == self.bytes.len() as u64
    }
}

/// One host buffer per virtual frame, grown on demand.
///
/// Lets a frame rewrite its uniforms while the GPU may still read the
/// previous frame's copy.
pub struct DescriptorBuffer {
    allocator: GpuAllocator,
    usage: vk::BufferUsageFlags,
    buffers: Buffered<Buffer>,
    written: Buffered<u64>,
}

impl DescriptorBuffer {
    /// Create the per-frame buffers. Each starts as a single zero byte.
    pub fn new(allocator: &GpuAllocator, usage: vk::BufferUsageFlags) -> Result<Self> {
        let mut buffer = Self {
            allocator: allocator.clone(),
            usage,
            buffers: std::array::from_fn(|_| Buffer::empty(allocator)),
            written: [0; FRAMES_IN_FLIGHT],
        };
        for frame_index in 0..FRAMES_IN_FLIGHT {
            buffer.write_at(frame_index, &[])?;
        }
        Ok(buffer)
    }

    /// Replace the contents of `frame_index`'s buffer with `bytes`.
    ///
    /// An empty write stores one zero byte, since buffers cannot be empty.
    pub fn write_at(&mut self, frame_index: usize, bytes: &[u8]) -> Result<()> {
        let bytes = if bytes.is_empty() { &[0_u8][..] } else { bytes };
        let len = bytes.len() as u64;

        let buffer = &mut self.buffers[frame_index];
        if buffer.is_empty() || buffer.size() < len {
            *buffer = self.allocator.create_buffer(self.usage, MemoryType::Host, len);
            if buffer.is_empty() {
                return Err(GpuError::Allocation(format!(
                    "Descriptor buffer of {len} bytes"
                )));
            }
        }

        buffer.write_bytes(0, bytes)?;
        self.written[frame_index] = len;
        Ok(())
    }

    /// Write a typed value to `frame_index`'s buffer.
    pub fn write<T: Pod>(&mut self, frame_index: usize, value: &T) -> Result<()> {
        self.write_at(frame_index, bytemuck::bytes_of(value))
    }

    /// The buffer and the range last written to it.
    pub fn descriptor_info_at(&self, frame_index: usize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffers[frame_index].handle(),
            offset: 0,
            range: self.written[frame_index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_laid_out_back_to_back() {
        let vertices = [0_u8; 48];
        let indices = [0_u8; 12];
        let (offsets, total) = span_offsets(&[&vertices, &[], &indices]);
        assert_eq!(offsets, vec![0, 48, 48]);
        assert_eq!(total, 60);
    }

    #[test]
    fn no_spans_have_zero_size() {
        assert_eq!(span_offsets(&[]), (Vec::new(), 0));
    }

    #[test]
    fn white_bitmap_is_valid() {
        let white = Bitmap::white();
        assert!(white.is_valid());
        assert_eq!(white.bytes, &[0xFF; 4]);
    }

    #[test]
    fn bitmap_size_must_match_bytes() {
        let pixels = [0_u8; 16];
        let square = Bitmap {
            bytes: &pixels,
            width: 2,
            height: 2,
        };
        assert!(square.is_valid());
        assert!(!Bitmap { width: 3, ..square }.is_valid());
        assert!(!Bitmap { height: 0, ..square }.is_valid());
        assert!(!Bitmap {
            bytes: &[],
            ..square
        }
        .is_valid());
    }

    #[test]
    fn memory_types_map_to_locations() {
        assert_eq!(MemoryType::Host.location(), MemoryLocation::CpuToGpu);
        assert_eq!(MemoryType::Device.location(), MemoryLocation::GpuOnly);
    }
}
