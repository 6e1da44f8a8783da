//! Quad application.

use std::mem::{offset_of, size_of, size_of_val};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use framewright_app::{AppContext, DearImGui, DrawContext, FramewrightApp};
use framewright_gpu::{Buffer, ShaderProgram, ShaderProgramCreateInfo, ShaderVertexInput};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

const VERTICES: [Vertex; 4] = [
    Vertex {
        position: Vec2::new(-0.5, -0.5),
        color: Vec3::new(1.0, 0.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.5, -0.5),
        color: Vec3::new(0.0, 1.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.5, 0.5),
        color: Vec3::new(0.0, 0.0, 1.0),
    },
    Vertex {
        position: Vec2::new(-0.5, 0.5),
        color: Vec3::new(1.0, 1.0, 0.0),
    },
];

const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Indices follow the vertices in the shared buffer.
const INDEX_OFFSET: u64 = size_of::<[Vertex; 4]>() as u64;

const VERTEX_ATTRIBUTES: [vk::VertexInputAttributeDescription; 2] = [
    vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32_SFLOAT,
        offset: offset_of!(Vertex, position) as u32,
    },
    vk::VertexInputAttributeDescription {
        location: 1,
        binding: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: offset_of!(Vertex, color) as u32,
    },
];

const VERTEX_BINDINGS: [vk::VertexInputBindingDescription; 1] = [vk::VertexInputBindingDescription {
    binding: 0,
    stride: size_of::<Vertex>() as u32,
    input_rate: vk::VertexInputRate::VERTEX,
}];

pub struct Quad {
    program: ShaderProgram,
    geometry: Buffer,
}

impl FramewrightApp for Quad {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let info = ShaderProgramCreateInfo {
            vertex_spirv: framewright_shaders::basic_vertex(),
            fragment_spirv: framewright_shaders::basic_fragment(),
            vertex_input: ShaderVertexInput {
                attributes: &VERTEX_ATTRIBUTES,
                bindings: &VERTEX_BINDINGS,
            },
            color_format: ctx.color_format(),
            ..Default::default()
        };
        // SAFETY: the features are the ones the device was created with.
        let program =
            unsafe { ShaderProgram::new(ctx.device(), ctx.gpu().enabled_features(), &info)? };

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&VERTICES);
        let index_bytes: &[u8] = bytemuck::cast_slice(&INDICES);
        debug_assert_eq!(vertex_bytes.len() as u64, INDEX_OFFSET);

        let geometry = ctx.allocator().create_device_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            ctx.command_block()?,
            &[vertex_bytes, index_bytes],
        )?;
        if geometry.is_empty() {
            anyhow::bail!("Failed to upload quad geometry");
        }

        tracing::info!(
            "Quad ready ({} bytes of geometry)",
            size_of_val(&VERTICES) + size_of_val(&INDICES)
        );

        Ok(Self { program, geometry })
    }

    fn draw(
        &mut self,
        ctx: &AppContext,
        frame: &mut DrawContext<'_, DearImGui>,
    ) -> anyhow::Result<()> {
        let device = ctx.device();
        let cmd = frame.command_buffer;
        let buffer = self.geometry.handle();

        // SAFETY: `cmd` is recording inside the frame's rendering scope.
        unsafe {
            self.program.bind(cmd, frame.framebuffer_size);
            device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, buffer, INDEX_OFFSET, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);
        }

        Ok(())
    }
}
