//! Asset lookup and SPIR-V loading.

use crate::constants::ASSETS_DIR_NAME;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Look for `<dir>/assets/`, starting at `start` and walking up the parent
/// directories. The filesystem root itself is not searched.
pub fn find_assets_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take_while(|dir| dir.parent().is_some())
        .map(|dir| dir.join(ASSETS_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

/// Locate the assets directory relative to the working directory.
///
/// Falls back to the working directory (with a warning) when no `assets/`
/// directory exists on the way up.
pub fn locate_assets_dir() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_default();
    find_assets_dir(&cwd).unwrap_or_else(|| {
        tracing::warn!("Could not locate '{ASSETS_DIR_NAME}' directory");
        cwd
    })
}

/// Reinterpret little-endian bytes as SPIR-V words.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidSpirv(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Read a SPIR-V file from disk.
pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    spirv_from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SPIRV_MAGIC;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framewright-assets-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_assets_in_an_ancestor() {
        let root = scratch_dir("ancestor");
        fs::create_dir_all(root.join("assets")).unwrap();
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_assets_dir(&nested), Some(root.join("assets")));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn ignores_assets_files() {
        let root = scratch_dir("file");
        fs::write(root.join("assets"), b"not a directory").unwrap();

        assert_ne!(find_assets_dir(&root), Some(root.join("assets")));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn spirv_words_are_little_endian() {
        let words = spirv_from_bytes(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 1]);
    }

    #[test]
    fn rejects_partial_words() {
        assert!(matches!(
            spirv_from_bytes(&[1, 2, 3, 4, 5]),
            Err(Error::InvalidSpirv(5))
        ));
    }

    #[test]
    fn read_spirv_reports_missing_files() {
        let root = scratch_dir("missing");
        let err = read_spirv(root.join("nope.spv")).unwrap_err();
        assert!(matches!(err, Error::ReadFile { .. }));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn read_spirv_loads_words() {
        let root = scratch_dir("load");
        let path = root.join("shader.spv");
        fs::write(&path, SPIRV_MAGIC.to_le_bytes()).unwrap();

        assert_eq!(read_spirv(&path).unwrap(), vec![SPIRV_MAGIC]);
        fs::remove_dir_all(root).unwrap();
    }
}
