//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias using ModelError.
pub type ModelResult<T> = Result<T, ModelError>;

/// Validation errors raised while building model objects.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("sector azimuths must be strictly increasing (entry {index}: {azimuth})")]
    SectorOrder { index: usize, azimuth: f64 },

    #[error("sector azimuth out of range [0, 360): {0}")]
    SectorAzimuth(f64),

    #[error("polygon needs at least 3 vertices, got {0}")]
    PolygonTooSmall(usize),

    #[error("geography radius must be positive: {0}")]
    BadRadius(f64),

    #[error("geography box dimensions must be positive: {width} x {height}")]
    BadBox { width: f64, height: f64 },

    #[error("contour needs at least 4 points, got {0}")]
    ContourTooSmall(usize),

    #[error("horizontal pattern must have 360 entries, got {0}")]
    BadHorizontalPattern(usize),

    #[error("vertical pattern needs at least 2 entries, got {0}")]
    BadVerticalPattern(usize),

    #[error("DTS parent needs at least one child source")]
    EmptyDts,
}
