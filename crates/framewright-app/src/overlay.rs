//! Dear ImGui overlay rendered by the frame engine.

use std::sync::Arc;

use ash::vk;
use framewright_gpu::{DebugOverlay, FRAMES_IN_FLIGHT};
use imgui::{Context, Ui};
use imgui_rs_vulkan_renderer::{DynamicRendering, Options, Renderer};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use tracing::{error, warn};
use winit::event::{Event, WindowEvent};
use winit::window::{Window, WindowId};

use crate::context::AppContext;

/// Where the overlay is in its per-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState {
    /// Nothing collected, nothing to render.
    Idle,
    /// Input prepared, widgets not built yet.
    Pending,
    /// Widgets built, draw data ready to render.
    Open,
}

/// Debug UI drawn over every frame.
///
/// The frame engine calls [`DebugOverlay::new_frame`] after acquiring an
/// image. Applications add widgets once per frame through [`ui`](Self::ui).
pub struct DearImGui {
    renderer: Renderer,
    platform: WinitPlatform,
    imgui: Context,
    window: Arc<Window>,
    state: FrameState,
}

impl DearImGui {
    /// Create the overlay for the context's window, rendering into images of
    /// `color_format`.
    ///
    /// # Safety
    /// The overlay must be dropped before the context's device.
    pub unsafe fn new(ctx: &AppContext, color_format: vk::Format) -> anyhow::Result<Self> {
        let mut imgui = Context::create();
        imgui.set_ini_filename(None);
        linearize_style(imgui.style_mut().colors.as_mut_slice());

        let mut platform = WinitPlatform::new(&mut imgui);
        platform.attach_window(imgui.io_mut(), &ctx.window, HiDpiMode::Rounded);

        let gpu = ctx.gpu();
        let renderer = Renderer::with_default_allocator(
            gpu.instance(),
            gpu.gpu().physical_device,
            ctx.device().clone(),
            ctx.queue(),
            ctx.command_pool().handle(),
            DynamicRendering {
                color_attachment_format: color_format,
                depth_attachment_format: None,
            },
            &mut imgui,
            Some(Options {
                in_flight_frames: FRAMES_IN_FLIGHT,
                ..Default::default()
            }),
        )?;

        Ok(Self {
            renderer,
            platform,
            imgui,
            window: Arc::clone(&ctx.window),
            state: FrameState::Idle,
        })
    }

    /// Forward a window event to imgui's input state.
    pub fn handle_event(&mut self, window: &Window, window_id: WindowId, event: &WindowEvent) {
        let event: Event<()> = Event::WindowEvent {
            window_id,
            event: event.clone(),
        };
        self.platform.handle_event(self.imgui.io_mut(), window, &event);
    }

    /// Build this frame's widgets. Only the first call per frame takes
    /// effect.
    pub fn ui<F>(&mut self, build: F)
    where
        F: FnOnce(&Ui),
    {
        match self.state {
            FrameState::Pending => {
                let ui = self.imgui.new_frame();
                build(ui);
                self.platform.prepare_render(ui, &self.window);
                self.state = FrameState::Open;
            }
            FrameState::Open => warn!("Overlay widgets already built this frame"),
            FrameState::Idle => warn!("Overlay used outside of a frame"),
        }
    }
}

impl DebugOverlay for DearImGui {
    fn new_frame(&mut self) {
        if self.state == FrameState::Open {
            // Discard a frame that was built but never rendered.
            self.imgui.render();
        }

        if let Err(e) = self.platform.prepare_frame(self.imgui.io_mut(), &self.window) {
            error!("Failed to prepare overlay frame: {e}");
            self.state = FrameState::Idle;
            return;
        }
        self.state = FrameState::Pending;
    }

    fn end_frame(&mut self) {
        if self.state == FrameState::Pending {
            let ui = self.imgui.new_frame();
            self.platform.prepare_render(ui, &self.window);
            self.state = FrameState::Open;
        }
    }

    fn render(&mut self, cmd: vk::CommandBuffer) {
        if self.state != FrameState::Open {
            return;
        }

        let draw_data = self.imgui.render();
        if let Err(e) = self.renderer.cmd_draw(cmd, draw_data) {
            error!("Failed to render overlay: {e}");
        }
        self.state = FrameState::Idle;
    }
}

/// Convert one sRGB-encoded channel to linear.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// The style palette is authored in sRGB, the swapchain expects linear
/// values. Alpha stays as is.
fn linearize_style(colors: &mut [[f32; 4]]) {
    for color in colors {
        for channel in &mut color[..3] {
            *channel = srgb_to_linear(*channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn srgb_endpoints_are_fixed() {
        assert_relative_eq!(srgb_to_linear(0.0), 0.0);
        assert_relative_eq!(srgb_to_linear(1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn srgb_midtone_darkens() {
        assert_relative_eq!(srgb_to_linear(0.5), 0.214_041, epsilon = 1e-5);
        assert_relative_eq!(srgb_to_linear(0.04), 0.04 / 12.92);
    }

    #[test]
    fn linearize_style_keeps_alpha() {
        let mut colors = [[0.5, 1.0, 0.0, 0.5]];
        linearize_style(&mut colors);
        assert_relative_eq!(colors[0][0], 0.214_041, epsilon = 1e-5);
        assert_relative_eq!(colors[0][1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(colors[0][3], 0.5);
    }
}
