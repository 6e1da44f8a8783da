//! Graphics pipelines for dynamic rendering.

use crate::error::{GpuError, Result};
use ash::vk;
use glam::IVec2;
use std::ops::BitOr;

/// Binary render states baked into a [`ShaderProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderProgramFlags(u8);

impl ShaderProgramFlags {
    pub const NONE: Self = Self(0);
    /// Standard alpha blending: `src * a + dst * (1 - a)`.
    pub const ALPHA_BLEND: Self = Self(1 << 0);
    /// Depth test and write, compare op less-or-equal.
    pub const DEPTH_TEST: Self = Self(1 << 1);

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ShaderProgramFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Vertex layout consumed by the vertex shader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderVertexInput<'a> {
    pub attributes: &'a [vk::VertexInputAttributeDescription],
    pub bindings: &'a [vk::VertexInputBindingDescription],
}

/// Everything needed to build a [`ShaderProgram`].
#[derive(Debug, Clone, Copy)]
pub struct ShaderProgramCreateInfo<'a> {
    pub vertex_spirv: &'a [u32],
    pub fragment_spirv: &'a [u32],
    pub vertex_input: ShaderVertexInput<'a>,
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    /// Format of the color attachment the program renders into.
    pub color_format: vk::Format,
    pub topology: vk::PrimitiveTopology,
    pub flags: ShaderProgramFlags,
}

impl Default for ShaderProgramCreateInfo<'_> {
    fn default() -> Self {
        Self {
            vertex_spirv: &[],
            fragment_spirv: &[],
            vertex_input: ShaderVertexInput::default(),
            set_layouts: &[],
            color_format: vk::Format::R8G8B8A8_SRGB,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            flags: ShaderProgramFlags::ALPHA_BLEND | ShaderProgramFlags::DEPTH_TEST,
        }
    }
}

/// A vertex + fragment shader pair with its pipeline layout.
///
/// One pipeline is built per polygon mode the device supports; `bind`
/// picks the one matching [`Self::polygon_mode`]. Viewport, scissor and
/// line width are dynamic.
pub struct ShaderProgram {
    device: ash::Device,
    layout: vk::PipelineLayout,
    fill: vk::Pipeline,
    line: Option<vk::Pipeline>,
    wide_lines: bool,
    /// Polygon mode used by the next `bind`. `LINE` falls back to fill when
    /// the device lacks `fillModeNonSolid`.
    pub polygon_mode: vk::PolygonMode,
    /// Line width used by the next `bind`. Clamped to 1 without `wideLines`.
    pub line_width: f32,
}

impl ShaderProgram {
    /// Create the program's pipelines.
    ///
    /// # Safety
    /// The device must be valid, `features` must be the features it was
    /// created with, and the shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        features: &vk::PhysicalDeviceFeatures,
        info: &ShaderProgramCreateInfo<'_>,
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(info.set_layouts);
        // SAFETY: caller guarantees the device is valid.
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::Pipeline(e.to_string()))?;

        let mut program = Self {
            device: device.clone(),
            layout,
            fill: vk::Pipeline::null(),
            line: None,
            wide_lines: features.wide_lines == vk::TRUE,
            polygon_mode: vk::PolygonMode::FILL,
            line_width: 1.0,
        };

        // From here on, Drop cleans up whatever was created.
        // SAFETY: forwarded to the caller.
        program.fill = unsafe { program.create_pipeline(info, vk::PolygonMode::FILL)? };
        if features.fill_mode_non_solid == vk::TRUE {
            // SAFETY: forwarded to the caller.
            program.line = Some(unsafe { program.create_pipeline(info, vk::PolygonMode::LINE)? });
        }

        Ok(program)
    }

    unsafe fn create_pipeline(
        &self,
        info: &ShaderProgramCreateInfo<'_>,
        polygon_mode: vk::PolygonMode,
    ) -> Result<vk::Pipeline> {
        let device = &self.device;

        // SAFETY: caller guarantees valid SPIR-V.
        let vert_module = unsafe { create_shader_module(device, info.vertex_spirv, "Vertex")? };
        let frag_module = match unsafe { create_shader_module(device, info.fragment_spirv, "Fragment") } {
            Ok(module) => module,
            Err(e) => {
                // SAFETY: the module is unused.
                unsafe { device.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(info.vertex_input.bindings)
            .vertex_attribute_descriptions(info.vertex_input.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(info.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .alpha_to_coverage_enable(false);

        let depth_test = info.flags.contains(ShaderProgramFlags::DEPTH_TEST);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = blend_attachment(info.flags);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::LINE_WIDTH,
        ];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [info.color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info);

        // SAFETY: all referenced state outlives the call.
        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        // SAFETY: modules are not needed once the pipeline exists.
        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        let pipelines = result.map_err(|(_pipelines, e)| GpuError::Pipeline(e.to_string()))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Pipeline("No pipeline returned".to_string()))
    }

    /// Set viewport, scissor and line width, then bind the pipeline for
    /// [`Self::polygon_mode`].
    ///
    /// # Safety
    /// `cmd` must be recording inside a rendering scope.
    pub unsafe fn bind(&self, cmd: vk::CommandBuffer, framebuffer_size: IVec2) {
        let line_width = if self.wide_lines {
            self.line_width
        } else {
            1.0
        };

        // SAFETY: caller guarantees `cmd` is recording.
        unsafe {
            self.device
                .cmd_set_viewport(cmd, 0, &[flipped_viewport(framebuffer_size)]);
            self.device
                .cmd_set_scissor(cmd, 0, &[full_scissor(framebuffer_size)]);
            self.device.cmd_set_line_width(cmd, line_width);
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline());
        }
    }

    /// Pipeline matching the current polygon mode.
    pub fn pipeline(&self) -> vk::Pipeline {
        match (self.polygon_mode, self.line) {
            (vk::PolygonMode::LINE, Some(line)) => line,
            _ => self.fill,
        }
    }

    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Whether line polygon mode is available.
    pub const fn supports_wireframe(&self) -> bool {
        self.line.is_some()
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        // SAFETY: the program may still be referenced by in-flight frames.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle: {e}");
            }
            for pipeline in std::iter::once(self.fill).chain(self.line) {
                if pipeline != vk::Pipeline::null() {
                    self.device.destroy_pipeline(pipeline, None);
                }
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// # Safety
/// The device must be valid and `code` must be valid SPIR-V.
unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    stage: &str,
) -> Result<vk::ShaderModule> {
    let shader_info = vk::ShaderModuleCreateInfo::default().code(code);
    // SAFETY: caller guarantees the device and code are valid.
    unsafe { device.create_shader_module(&shader_info, None) }
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

fn blend_attachment(flags: ShaderProgramFlags) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(flags.contains(ShaderProgramFlags::ALPHA_BLEND))
        .color_blend_op(vk::BlendOp::ADD)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Viewport flipped about the X axis so +Y points up.
pub fn flipped_viewport(framebuffer_size: IVec2) -> vk::Viewport {
    let size = framebuffer_size.as_vec2();
    vk::Viewport {
        x: 0.0,
        y: size.y,
        width: size.x,
        height: -size.y,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole framebuffer.
pub fn full_scissor(framebuffer_size: IVec2) -> vk::Rect2D {
    let size = framebuffer_size.max(IVec2::ZERO).as_uvec2();
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: vk::Extent2D {
            width: size.x,
            height: size.y,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_is_flipped() {
        let viewport = flipped_viewport(IVec2::new(800, 600));
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn scissor_covers_framebuffer() {
        let scissor = full_scissor(IVec2::new(640, 480));
        assert_eq!(scissor.offset, vk::Offset2D::default());
        assert_eq!(
            scissor.extent,
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
        assert_eq!(full_scissor(IVec2::new(-1, 5)).extent.width, 0);
    }

    #[test]
    fn flags_combine() {
        let flags = ShaderProgramFlags::ALPHA_BLEND | ShaderProgramFlags::DEPTH_TEST;
        assert!(flags.contains(ShaderProgramFlags::ALPHA_BLEND));
        assert!(flags.contains(ShaderProgramFlags::DEPTH_TEST));
        assert!(!ShaderProgramFlags::NONE.contains(ShaderProgramFlags::ALPHA_BLEND));
        assert!(ShaderProgramFlags::NONE.contains(ShaderProgramFlags::NONE));
    }

    #[test]
    fn blending_follows_flag() {
        assert_eq!(
            blend_attachment(ShaderProgramFlags::ALPHA_BLEND).blend_enable,
            vk::TRUE
        );
        assert_eq!(blend_attachment(ShaderProgramFlags::NONE).blend_enable, vk::FALSE);
    }

    #[test]
    fn default_create_info_blends_and_tests_depth() {
        let info = ShaderProgramCreateInfo::default();
        assert!(info.flags.contains(ShaderProgramFlags::ALPHA_BLEND));
        assert!(info.flags.contains(ShaderProgramFlags::DEPTH_TEST));
        assert_eq!(info.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }
}
