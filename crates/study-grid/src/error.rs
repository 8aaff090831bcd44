//! Error types for grid and point handling.

use thiserror::Error;

/// Result type alias using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised by grid layout and point storage.
#[derive(Debug, Error)]
pub enum GridError {
    /// Two field records for one (point, source, percent-time). Fatal: the
    /// run aborts because correctness cannot be established.
    #[error("duplicate field for point {point} source {source_key} percent-time {percent_time}")]
    DuplicateField {
        point: u32,
        source_key: u32,
        percent_time: u8,
    },

    /// Grid configuration that cannot be laid out.
    #[error("invalid grid configuration: {0}")]
    BadConfig(String),

    /// The coverage bounds reach above the grid latitude ceiling.
    #[error("study area reaches latitude {0:.2}, beyond the 75-degree ceiling")]
    LatitudeCeiling(f64),
}
