//! Error types for terrain access.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using TerrainError.
pub type TerrainResult<T> = Result<T, TerrainError>;

/// Errors raised by the terrain cache.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// The per-process memory budget is below the minimum viable cache.
    #[error("terrain cache budget {budget} below minimum {minimum} bytes")]
    InsufficientMemory { budget: usize, minimum: usize },

    /// A tile file the status index promised is not on disk. Non-fatal:
    /// lookups retry the next-coarser database for the cell.
    #[error("tile file missing for file id {file_id}")]
    MissingFile { file_id: u32 },

    /// I/O failure reading a tile or index file.
    #[error("terrain I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file's magic number matches no known variant.
    #[error("bad magic {magic:#010x} in {path}")]
    BadMagic { path: PathBuf, magic: u32 },

    /// The file id in the header does not match the tile the file was
    /// opened for.
    #[error("file id mismatch in {path}: expected {expected}, found {found}")]
    BadFileId {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// A cell record is shorter than its directory entry claims.
    #[error("truncated cell record in {path}: wanted {wanted} bytes, got {got}")]
    Truncated {
        path: PathBuf,
        wanted: usize,
        got: usize,
    },

    /// Reserved or unknown compression code in a cell flag byte.
    #[error("unknown compression code {code} in {path}")]
    UnknownCompression { path: PathBuf, code: u8 },
}
