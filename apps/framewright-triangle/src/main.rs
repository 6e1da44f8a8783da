//! Hello triangle.
//!
//! Three vertex-colored vertices in a host-visible vertex buffer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p framewright-triangle
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use framewright_app::{run_app, AppConfig};

use crate::app::Triangle;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_app::<Triangle>(AppConfig::new("Framewright - Triangle").with_size(WIDTH, HEIGHT))
}
