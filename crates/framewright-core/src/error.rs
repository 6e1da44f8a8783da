//! Errors from asset loading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The file at `path` could not be read.
    #[error("cannot read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Byte length that is not a multiple of the 4-byte SPIR-V word.
    #[error("SPIR-V blob of {0} bytes is not word aligned")]
    InvalidSpirv(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
