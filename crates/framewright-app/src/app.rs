//! The application hook trait driven by [`run_app`](crate::run_app).

use crate::context::AppContext;
use crate::overlay::DearImGui;
use framewright_gpu::DrawContext;
use winit::event::WindowEvent;

/// A demo or tool rendered by the frame engine.
///
/// The runner owns the window, the GPU context and the frame engine. The
/// application creates its own pipelines and buffers in [`init`](Self::init)
/// and records into the already-open rendering scope in [`draw`](Self::draw).
/// Only `init` and `draw` are required.
pub trait FramewrightApp: Sized {
    /// Builds the application once the swapchain and overlay exist.
    ///
    /// Uploads go through [`AppContext::command_block`].
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Per-frame state step; `dt` is in seconds.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &AppContext, dt: f32) {}

    /// Records the scene for the acquired image.
    ///
    /// The image has been cleared and `frame.command_buffer` is inside a
    /// rendering scope targeting it. Widgets go through `frame.overlay`,
    /// which is drawn on top after this returns. An `Err` stops the event
    /// loop.
    fn draw(
        &mut self,
        ctx: &AppContext,
        frame: &mut DrawContext<'_, DearImGui>,
    ) -> anyhow::Result<()>;

    /// Window size changed. Either dimension may be zero while minimized.
    ///
    /// The swapchain is recreated by the frame engine; only size-dependent
    /// application state needs to react here.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Receives each window event after the overlay has seen it. Returning
    /// `true` stops the runner from handling it further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Last call before the GPU context is torn down. The device is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
