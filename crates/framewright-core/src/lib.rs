//! Core types and utilities for the Framewright renderer.
//!
//! This crate provides the pieces shared by every other crate:
//! - The framework error type
//! - 2D transforms producing model and view matrices
//! - Asset directory lookup and SPIR-V loading

pub mod assets;
pub mod error;
pub mod transform;

pub use assets::{locate_assets_dir, read_spirv, spirv_from_bytes};
pub use error::{Error, Result};
pub use transform::Transform;

/// Framework-wide constants
pub mod constants {
    /// Name of the directory searched for by [`crate::locate_assets_dir`]
    pub const ASSETS_DIR_NAME: &str = "assets";
    /// First word of every SPIR-V module
    pub const SPIRV_MAGIC: u32 = 0x0723_0203;
}
