//! Textured quad application.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use framewright_app::ui::{Condition, Drag, Ui};
use framewright_app::{AppContext, DearImGui, DrawContext, FramewrightApp};
use framewright_core::{locate_assets_dir, Transform};
use framewright_gpu::texture::default_sampler_info;
use framewright_gpu::{
    write_combined_image_sampler, write_uniform_buffer, Bitmap, Buffer, DescriptorBuffer,
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, ShaderProgram,
    ShaderProgramCreateInfo, ShaderVertexInput, Texture, FRAMES_IN_FLIGHT,
};
use glam::{Mat4, Vec2, Vec3};
use tracing::{info, warn};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
    uv: Vec2,
}

const fn vertex(x: f32, y: f32, u: f32, v: f32) -> Vertex {
    Vertex {
        position: Vec2::new(x, y),
        color: Vec3::ONE,
        uv: Vec2::new(u, v),
    }
}

const VERTICES: [Vertex; 4] = [
    vertex(-200.0, -200.0, 0.0, 1.0),
    vertex(200.0, -200.0, 1.0, 1.0),
    vertex(200.0, 200.0, 1.0, 0.0),
    vertex(-200.0, 200.0, 0.0, 0.0),
];

const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

const INDEX_OFFSET: u64 = size_of::<[Vertex; 4]>() as u64;

const VERTEX_ATTRIBUTES: [vk::VertexInputAttributeDescription; 3] = [
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
    vk::VertexInputAttributeDescription {
        location: 2,
        binding: 0,
        format: vk::Format::R32G32_SFLOAT,
        offset: offset_of!(Vertex, uv) as u32,
    },
];

const VERTEX_BINDINGS: [vk::VertexInputBindingDescription; 1] = [vk::VertexInputBindingDescription {
    binding: 0,
    stride: size_of::<Vertex>() as u32,
    input_rate: vk::VertexInputRate::VERTEX,
}];

/// 2×2 red, green, blue, yellow.
const RGBY_PIXELS: [u8; 16] = [
    0xff, 0x00, 0x00, 0xff, //
    0x00, 0xff, 0x00, 0xff, //
    0x00, 0x00, 0xff, 0xff, //
    0xff, 0xff, 0x00, 0xff, //
];

const TEXTURE_PATH: &str = "textures/quad.png";

/// Orthographic projection centered on the origin, one unit per pixel.
fn view_projection(framebuffer_size: glam::IVec2, view: &Transform) -> Mat4 {
    let half = 0.5 * framebuffer_size.as_vec2();
    Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -1.0, 1.0) * view.view_matrix()
}

fn load_texture_image() -> Option<image::RgbaImage> {
    let path = locate_assets_dir().join(TEXTURE_PATH);
    if !path.is_file() {
        return None;
    }
    match image::open(&path) {
        Ok(image) => {
            info!("Loaded texture {}", path.display());
            Some(image.to_rgba8())
        }
        Err(e) => {
            warn!("Failed to load {}: {e}", path.display());
            None
        }
    }
}

/// Inspector state edited through the overlay.
struct Inspector {
    view: Transform,
    wireframe: bool,
    line_width_range: [f32; 2],
}

impl Inspector {
    fn build(&mut self, ui: &Ui, program: &mut ShaderProgram) {
        ui.window("Inspect")
            .size([200.0, 100.0], Condition::Once)
            .build(|| {
                if let Some(_node) = ui.tree_node("View") {
                    let mut position = self.view.position.to_array();
                    if Drag::new("position").build_array(ui, &mut position[..]) {
                        self.view.position = Vec2::from_array(position);
                    }
                    Drag::new("rotation").build(ui, &mut self.view.rotation);
                    let mut scale = self.view.scale.to_array();
                    if Drag::new("scale").build_array(ui, &mut scale[..]) {
                        self.view.scale = Vec2::from_array(scale);
                    }
                }

                ui.separator();

                if !program.supports_wireframe() {
                    ui.text_disabled("wireframe unsupported");
                    return;
                }

                if ui.checkbox("wireframe", &mut self.wireframe) {
                    program.polygon_mode = if self.wireframe {
                        vk::PolygonMode::LINE
                    } else {
                        vk::PolygonMode::FILL
                    };
                }

                if self.wireframe {
                    let [min, max] = self.line_width_range;
                    ui.set_next_item_width(100.0);
                    Drag::new("line width")
                        .range(min, max)
                        .speed(0.25)
                        .build(ui, &mut program.line_width);
                }
            });
    }
}

pub struct TexturedQuad {
    program: ShaderProgram,
    descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
    _descriptor_pool: DescriptorPool,
    _set_layouts: [DescriptorSetLayout; 2],
    texture: Texture,
    view_ubo: DescriptorBuffer,
    geometry: Buffer,
    inspector: Inspector,
}

impl FramewrightApp for TexturedQuad {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = ctx.device();

        // SAFETY: the device is valid for the lifetime of the context.
        let set_layouts = unsafe {
            [
                DescriptorSetLayoutBuilder::new()
                    .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
                    .build(device)?,
                DescriptorSetLayoutBuilder::new()
                    .combined_image_sampler(0, vk::ShaderStageFlags::ALL_GRAPHICS)
                    .build(device)?,
            ]
        };
        let layout_handles = set_layouts.each_ref().map(DescriptorSetLayout::handle);

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            },
        ];
        // SAFETY: the device is valid.
        let descriptor_pool = unsafe { DescriptorPool::new(device, 16, &pool_sizes)? };
        let descriptor_sets = (0..FRAMES_IN_FLIGHT)
            .map(|_| descriptor_pool.allocate(&layout_handles))
            .collect::<Result<Vec<_>, _>>()?;

        let info = ShaderProgramCreateInfo {
            vertex_spirv: framewright_shaders::textured_vertex(),
            fragment_spirv: framewright_shaders::textured_fragment(),
            vertex_input: ShaderVertexInput {
                attributes: &VERTEX_ATTRIBUTES,
                bindings: &VERTEX_BINDINGS,
            },
            set_layouts: &layout_handles,
            color_format: ctx.color_format(),
            ..Default::default()
        };
        // SAFETY: the features are the ones the device was created with.
        let program = unsafe { ShaderProgram::new(device, ctx.gpu().enabled_features(), &info)? };

        let geometry = ctx.allocator().create_device_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            ctx.command_block()?,
            &[bytemuck::cast_slice(&VERTICES), bytemuck::cast_slice(&INDICES)],
        )?;
        if geometry.is_empty() {
            anyhow::bail!("Failed to upload quad geometry");
        }

        let view_ubo = DescriptorBuffer::new(ctx.allocator(), vk::BufferUsageFlags::UNIFORM_BUFFER)?;

        let loaded = load_texture_image();
        let (bitmap, sampler) = match &loaded {
            Some(image) => (
                Bitmap {
                    bytes: image.as_raw(),
                    width: image.width(),
                    height: image.height(),
                },
                default_sampler_info(),
            ),
            None => (
                Bitmap {
                    bytes: &RGBY_PIXELS,
                    width: 2,
                    height: 2,
                },
                default_sampler_info().mag_filter(vk::Filter::NEAREST),
            ),
        };
        // SAFETY: the allocator's device is the context's device.
        let texture = unsafe { Texture::new(ctx.allocator(), ctx.command_block()?, bitmap, &sampler)? };

        let limits = &ctx.gpu().gpu().properties.limits;
        let inspector = Inspector {
            view: Transform::default(),
            wireframe: false,
            line_width_range: limits.line_width_range,
        };

        info!("Textured quad ready");

        Ok(Self {
            program,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layouts: set_layouts,
            texture,
            view_ubo,
            geometry,
            inspector,
        })
    }

    fn draw(
        &mut self,
        ctx: &AppContext,
        frame: &mut DrawContext<'_, DearImGui>,
    ) -> anyhow::Result<()> {
        let inspector = &mut self.inspector;
        let program = &mut self.program;
        frame.overlay.ui(|ui| inspector.build(ui, program));

        let device = ctx.device();
        let cmd = frame.command_buffer;
        let sets = &self.descriptor_sets[frame.frame_index];

        let view_projection = view_projection(frame.framebuffer_size, &self.inspector.view);
        self.view_ubo.write(frame.frame_index, &view_projection)?;

        // SAFETY: this frame's sets are not in use; its fence was waited on.
        unsafe {
            write_uniform_buffer(
                device,
                sets[0],
                0,
                &self.view_ubo.descriptor_info_at(frame.frame_index),
            );
            write_combined_image_sampler(device, sets[1], 0, &self.texture.descriptor_info());
        }

        let buffer = self.geometry.handle();
        // SAFETY: `cmd` is recording inside the frame's rendering scope.
        unsafe {
            self.program.bind(cmd, frame.framebuffer_size);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.program.layout(),
                0,
                sets,
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, buffer, INDEX_OFFSET, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, INDICES.len() as u32, 1, 0, 0, 0);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec2, Vec4};

    #[test]
    fn quad_corners_reach_clip_space_edges() {
        let vp = view_projection(IVec2::new(400, 400), &Transform::default());
        let corner = vp * Vec4::new(200.0, 200.0, 0.0, 1.0);
        assert!((corner.x - 1.0).abs() < 1e-6);
        assert!((corner.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rgby_checker_is_a_valid_bitmap() {
        let bitmap = Bitmap {
            bytes: &RGBY_PIXELS,
            width: 2,
            height: 2,
        };
        assert!(bitmap.is_valid());
    }
}
