//! Error types for datum conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using DatumError.
pub type DatumResult<T> = Result<T, DatumError>;

/// Errors raised by datum conversions.
#[derive(Debug, Error)]
pub enum DatumError {
    /// The point lies outside every declared conversion region. Non-fatal:
    /// callers substitute the identity conversion.
    #[error("point outside all datum conversion regions")]
    OutsideDataArea,

    /// The iterative from-NAD83 inversion failed to settle. Non-fatal for a
    /// single coordinate: the caller retains the input coordinates.
    #[error("datum inversion did not converge")]
    IterationDidNotConverge,

    /// A NADCON table could not be read on first access. This is a
    /// database-I/O-class failure and aborts the run.
    #[error("failed to read NADCON table {path}: {source}")]
    TableIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A NADCON table file is present but malformed.
    #[error("invalid NADCON table {path}: {reason}")]
    TableFormat { path: PathBuf, reason: String },
}
