//! Debug overlay drawn on top of each frame.

use ash::vk;

/// Immediate-mode UI layer driven by the frame engine.
///
/// Per frame the engine calls `new_frame` after a successful acquire,
/// `end_frame` once the application has drawn, and `render` inside a
/// load-op rendering scope on the acquired image.
pub trait DebugOverlay {
    /// Start collecting widgets for a new frame.
    fn new_frame(&mut self);

    /// Stop collecting widgets. Calling it twice is harmless.
    fn end_frame(&mut self);

    /// Record draw commands for the collected widgets into `cmd`.
    fn render(&mut self, cmd: vk::CommandBuffer);
}

/// No overlay.
impl DebugOverlay for () {
    fn new_frame(&mut self) {}

    fn end_frame(&mut self) {}

    fn render(&mut self, _cmd: vk::CommandBuffer) {}
}
