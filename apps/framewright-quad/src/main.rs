//! Indexed quad.
//!
//! Four vertices and six indices uploaded into one device-local buffer
//! through a command block.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p framewright-quad
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use framewright_app::{run_app, AppConfig};

use crate::app::Quad;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<Quad>(AppConfig::new("Framewright - Quad").with_size(WIDTH, HEIGHT))
}
