//! Triangle application.

use std::mem::{offset_of, size_of, size_of_val};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use framewright_app::{AppContext, DearImGui, DrawContext, FramewrightApp};
use framewright_gpu::{
    Buffer, MemoryType, ShaderProgram, ShaderProgramCreateInfo, ShaderVertexInput,
};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

const VERTICES: [Vertex; 3] = [
    Vertex {
        position: Vec2::new(-0.5, -0.5),
        color: Vec3::new(1.0, 0.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.5, -0.5),
        color: Vec3::new(0.0, 1.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.0, 0.5),
        color: Vec3::new(0.0, 0.0, 1.0),
    },
];

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

pub struct Triangle {
    program: ShaderProgram,
    vertices: Buffer,
}

impl FramewrightApp for Triangle {
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

        let mut vertices = ctx.allocator().create_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryType::Host,
            size_of_val(&VERTICES) as u64,
        );
        if vertices.is_empty() {
            anyhow::bail!("Failed to create vertex buffer");
        }
        vertices.write(0, &VERTICES)?;

        tracing::info!("Triangle ready");

        Ok(Self { program, vertices })
    }

    fn draw(
        &mut self,
        ctx: &AppContext,
        frame: &mut DrawContext<'_, DearImGui>,
    ) -> anyhow::Result<()> {
        let device = ctx.device();
        let cmd = frame.command_buffer;

        // SAFETY: `cmd` is recording inside the frame's rendering scope.
        unsafe {
            self.program.bind(cmd, frame.framebuffer_size);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.handle()], &[0]);
            device.cmd_draw(cmd, 3, 1, 0, 0);
        }

        Ok(())
    }
}
