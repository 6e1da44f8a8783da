//! Textured quad.
//!
//! A 400×400 quad sampling a texture through a combined image sampler, seen
//! through an orthographic camera. The "Inspect" window moves, rotates and
//! scales the view and toggles wireframe rendering.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p framewright-textured-quad
//! ```
//!
//! The texture is `assets/textures/quad.png` when present, otherwise a 2×2
//! red/green/blue/yellow checker.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use framewright_app::{run_app, AppConfig};

use crate::app::TexturedQuad;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<TexturedQuad>(
        AppConfig::new("Framewright - Textured Quad")
            .with_size(WIDTH, HEIGHT)
            .with_clear_color([0.05, 0.05, 0.08, 1.0]),
    )
}
