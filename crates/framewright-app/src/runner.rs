//! Window, event loop and the per-frame drive of a [`FramewrightApp`].

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use framewright_gpu::{FrameEngine, Swapchain, VulkanDispatch, DEFAULT_CLEAR_COLOR};
use glam::IVec2;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::FramewrightApp;
use crate::context::AppContext;
use crate::overlay::DearImGui;

#[cfg(feature = "profiling-tracy")]
const DEFAULT_LOG_FILTER: &str = "info,framewright_app=trace,framewright_gpu=trace";
#[cfg(not(feature = "profiling-tracy"))]
const DEFAULT_LOG_FILTER: &str = "info";

/// Window and swapchain settings for [`run_app`].
#[derive(Clone)]
pub struct AppConfig {
    pub title: String,
    /// Initial inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Preferred present mode, FIFO is used when it is unsupported.
    pub present_mode: vk::PresentModeKHR,
    /// Color the swapchain image is cleared to every frame.
    pub clear_color: [f32; 4],
    /// Request `VK_LAYER_KHRONOS_validation`. On by default in debug builds.
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Framewright".to_string(),
            width: 1280,
            height: 720,
            present_mode: vk::PresentModeKHR::FIFO,
            clear_color: DEFAULT_CLEAR_COLOR,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Defaults with a custom window title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Linear RGBA.
    #[must_use]
    pub const fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run an application with the given configuration.
///
/// Initializes logging, creates the window, GPU context and frame engine,
/// and runs the event loop until the window is closed or a frame fails.
pub fn run_app<A: FramewrightApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!(title = %config.title, "Starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct AppRunner<A: FramewrightApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    error: Option<anyhow::Error>,
}

/// Everything that exists between `resumed` and shutdown.
///
/// Field order is drop order: application resources, then the frame engine,
/// then the context they were created from.
struct AppState<A: FramewrightApp> {
    app: A,
    engine: FrameEngine<VulkanDispatch, DearImGui>,
    ctx: AppContext,
    last_frame: Instant,
}

impl<A: FramewrightApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Window resumed, creating GPU state");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Ready");
            }
            Err(e) => {
                error!("Initialization failed: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        let window = Arc::clone(&state.ctx.window);
        state
            .engine
            .overlay_mut()
            .handle_event(&window, window_id, &event);

        if state.app.on_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render_frame() {
                    error!("Frame failed: {e:#}");
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    self.error = Some(e);
                    event_loop.exit();
                    return;
                }
                state.ctx.window.request_redraw();
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = state.app.on_resize(&mut state.ctx, size.width, size.height) {
                    error!(width = size.width, height = size.height, "on_resize failed: {e:#}");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: FramewrightApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        // SAFETY: the context keeps its own handle to the window.
        let mut ctx = unsafe { AppContext::new(window, &self.config)? };

        // SAFETY: surface, device and queue all come from the same context.
        let swapchain = unsafe {
            Swapchain::new(
                ctx.dispatch(),
                ctx.gpu().gpu(),
                ctx.gpu().surface(),
                ctx.framebuffer_size().max(IVec2::ONE),
                self.config.present_mode,
            )?
        };

        ctx.color_format = swapchain.format();

        // SAFETY: the overlay renders into images of the swapchain's format
        // and is dropped together with the engine, before the context.
        let overlay = unsafe { DearImGui::new(&ctx, swapchain.format())? };

        // SAFETY: the graphics queue presents to the context's surface.
        let mut engine = unsafe { FrameEngine::new(ctx.dispatch(), swapchain, ctx.queue(), overlay)? };
        engine.set_clear_color(self.config.clear_color);

        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            engine,
            ctx,
            last_frame: Instant::now(),
        })
    }
}

impl<A: FramewrightApp> AppState<A> {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.app.update(&self.ctx, dt);

        let app = &mut self.app;
        let ctx = &self.ctx;
        let mut drawn = Ok(());
        self.engine
            .frame(ctx.framebuffer_size(), |frame| drawn = app.draw(ctx, frame))?;
        drawn
    }

    fn cleanup(&mut self) {
        if let Err(e) = self.ctx.gpu().wait_idle() {
            error!("Failed to wait for device idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);
    }
}

impl<A: FramewrightApp> Drop for AppState<A> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.gpu().wait_idle() {
            error!("Failed to wait for device idle: {e}");
        }
    }
}
