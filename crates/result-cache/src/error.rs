//! Error types for the result cache.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by cache reads and writes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O failure on a cache file.
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache file that exists is structurally bad: wrong magic, truncated
    /// record, or a checksum that does not match its running value.
    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A desired-cell record names a cell outside the study grid. The cache
    /// is not deleted (the error may be elsewhere), but the read fails.
    #[error("cell ({cell_lat}, {cell_lon}) in {path} is outside the study grid")]
    CellOutsideGrid {
        path: PathBuf,
        cell_lat: i32,
        cell_lon: i32,
    },
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
