//! Application framework for Framewright.
//!
//! This crate handles the boilerplate around the frame engine:
//! - Window creation and the winit event loop
//! - GPU context and swapchain setup
//! - A Dear ImGui overlay drawn over every frame
//! - Logging setup
//!
//! # Example
//!
//! ```no_run
//! use framewright_app::{run_app, AppConfig, AppContext, DearImGui, DrawContext, FramewrightApp};
//!
//! struct MyApp;
//!
//! impl FramewrightApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn draw(
//!         &mut self,
//!         _ctx: &AppContext,
//!         frame: &mut DrawContext<'_, DearImGui>,
//!     ) -> anyhow::Result<()> {
//!         frame.overlay.ui(|ui| ui.text("Hello"));
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App"))
//! }
//! ```

mod app;
mod context;
mod overlay;
mod runner;

pub use app::FramewrightApp;
pub use context::AppContext;
pub use overlay::{srgb_to_linear, DearImGui};
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use ::imgui as ui;
pub use framewright_gpu::{DrawContext, GpuContext};
pub use winit::event::WindowEvent;
