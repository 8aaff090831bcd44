//! Engine error taxonomy.
//!
//! Fatal errors abort the scenario run with a negative class code and a
//! non-zero process exit; non-fatal conditions are handled at their call
//! sites (identity datum substitution, cache drops, terrain fallback) and
//! only counted here.

use thiserror::Error;

use study_grid::GridError;
use terrain::TerrainError;

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The terrain cache cannot be provisioned.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The station-database collaborator failed unrecoverably.
    #[error("station database error: {0}")]
    DatabaseIo(String),

    /// An expected cache file is structurally unusable.
    #[error("cache corrupt: {0}")]
    CacheCorrupt(String),

    /// Two field records for one (point, source, percent-time).
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    /// Fatal terrain I/O (bad magic, truncation, unknown compression).
    #[error("terrain error: {0}")]
    Terrain(String),

    /// Grid layout failure (bad configuration or latitude ceiling).
    #[error("grid error: {0}")]
    Grid(String),

    /// The requested scenario is not part of the study.
    #[error("unknown scenario {0}")]
    UnknownScenario(u32),
}

impl EngineError {
    /// Negative class code reported from the top-level scenario run.
    pub fn class_code(&self) -> i32 {
        match self {
            EngineError::OutOfMemory(_) => -1,
            EngineError::DatabaseIo(_) => -2,
            EngineError::CacheCorrupt(_) => -3,
            EngineError::DuplicateField(_) => -4,
            EngineError::Terrain(_) => -5,
            EngineError::Grid(_) => -6,
            EngineError::UnknownScenario(_) => -7,
        }
    }
}

impl From<TerrainError> for EngineError {
    fn from(err: TerrainError) -> Self {
        match err {
            TerrainError::InsufficientMemory { .. } => EngineError::OutOfMemory(err.to_string()),
            other => EngineError::Terrain(other.to_string()),
        }
    }
}

impl From<GridError> for EngineError {
    fn from(err: GridError) -> Self {
        match err {
            GridError::DuplicateField { .. } => EngineError::DuplicateField(err.to_string()),
            other => EngineError::Grid(other.to_string()),
        }
    }
}

impl From<result_cache::CacheError> for EngineError {
    fn from(err: result_cache::CacheError) -> Self {
        EngineError::CacheCorrupt(err.to_string())
    }
}
