//! SPIR-V for the Framewright demo programs.
//!
//! The GLSL sources under `shaders/` are compiled by the build script and
//! embedded here. Two programs are provided:
//! - `basic`: per-vertex color, positions already in clip space
//! - `textured`: a view-projection uniform (set 0) and a sampled texture
//!   (set 1) modulated by the vertex color

use std::sync::OnceLock;

/// Embedded SPIR-V (raw bytes, not necessarily 4-byte aligned).
mod spirv_bytes {
    pub static BASIC_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/basic.vert.spv"));
    pub static BASIC_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/basic.frag.spv"));
    pub static TEXTURED_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured.vert.spv"));
    pub static TEXTURED_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured.frag.spv"));
}

fn words(cell: &'static OnceLock<Vec<u32>>, bytes: &[u8]) -> &'static [u32] {
    // The build script only writes whole SPIR-V words.
    cell.get_or_init(|| framewright_core::spirv_from_bytes(bytes).unwrap_or_default())
}

/// Vertex shader taking `vec2` position (location 0) and `vec3` color (location 1).
pub fn basic_vertex() -> &'static [u32] {
    static SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
    words(&SPIRV, spirv_bytes::BASIC_VERT)
}

/// Fragment shader writing the interpolated vertex color.
pub fn basic_fragment() -> &'static [u32] {
    static SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
    words(&SPIRV, spirv_bytes::BASIC_FRAG)
}

/// Vertex shader taking position, color and `vec2` uv (location 2),
/// transformed by the `mat4` uniform at set 0, binding 0.
pub fn textured_vertex() -> &'static [u32] {
    static SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
    words(&SPIRV, spirv_bytes::TEXTURED_VERT)
}

/// Fragment shader sampling the texture at set 1, binding 0.
pub fn textured_fragment() -> &'static [u32] {
    static SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
    words(&SPIRV, spirv_bytes::TEXTURED_FRAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framewright_core::constants::SPIRV_MAGIC;

    #[test]
    fn every_shader_is_spirv() {
        for shader in [
            basic_vertex(),
            basic_fragment(),
            textured_vertex(),
            textured_fragment(),
        ] {
            assert_eq!(shader.first(), Some(&SPIRV_MAGIC), "Invalid SPIR-V magic number");
            assert!(shader.len() > 5, "Shader shorter than a SPIR-V header");
        }
    }

    #[test]
    fn shaders_are_cached() {
        assert!(std::ptr::eq(basic_vertex(), basic_vertex()));
    }
}
