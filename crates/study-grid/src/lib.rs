//! Study grid layout and per-cell study points.
//!
//! A scenario lays one grid over the union of its sources' coverage bounds.
//! Local grids use one uniform cell size; global grids hold the latitude
//! cell size constant and step the longitude cell size by latitude band so
//! cell area stays nearly constant, which keeps independently laid-out grids
//! mergeable. Study points inside the cells aggregate Census population and
//! carry the per-source field records.

pub mod aggregate;
pub mod error;
pub mod layout;
pub mod points;
pub mod service_area;

pub use aggregate::AggregationMethod;
pub use error::{GridError, GridResult};
pub use layout::{GridConfig, GridMode, RowInfo, StudyGrid, GRID_MAX_LATITUDE};
pub use points::{
    CenPointStatus, CensusPoint, Field, FieldStatus, PointStore, Pool, StudyPoint,
    CENSUS_POINT_SLAB, FIELD_SLAB, STUDY_POINT_SLAB,
};
pub use service_area::service_area_contains;
