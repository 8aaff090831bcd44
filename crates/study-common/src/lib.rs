//! Common types and geographic primitives shared across the coverage-study
//! workspace.
//!
//! Coordinate convention throughout the workspace: latitude in degrees,
//! positive north; longitude in degrees, positive **west**. Grid and cache
//! indices are derived from `floor(degrees * 3600)` (whole arc-seconds).

pub mod bounds;
pub mod contour;
pub mod coords;
pub mod error;
pub mod geography;
pub mod source;

pub use bounds::IndexBounds;
pub use contour::Contour;
pub use coords::{bear_distance, coordinates, lat_index, lon_index, LatLon, DEFAULT_KM_PER_DEGREE};
pub use error::{ModelError, ModelResult};
pub use geography::{Geography, GeographyKind, Sector};
pub use source::{
    Band, Country, DtsParent, EmissionMask, FmClass, HorizontalPattern, MatrixPattern,
    ServiceKind, Source, SourceKey, VerticalPattern,
};
