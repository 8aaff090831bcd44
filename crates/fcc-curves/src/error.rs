//! Error types for curve lookups.

use thiserror::Error;

/// Result type alias using CurveError.
pub type CurveResult<T> = Result<T, CurveError>;

/// Errors raised by curve lookups.
#[derive(Debug, Error)]
pub enum CurveError {
    /// The corrected free-space distance inversion failed to settle.
    /// Non-fatal: the caller keeps the uncorrected distance.
    #[error("corrected distance inversion did not converge")]
    IterationDidNotConverge,

    /// An argument outside the domain the curves are defined over.
    #[error("invalid curve argument: {0}")]
    BadArgument(String),
}
