//! Shared test utilities for the coverage-study workspace.
//!
//! This crate provides common testing infrastructure:
//! - Temporary study/cache directory helpers
//! - Synthetic terrain tile and status-index writers
//! - Source and scenario fixtures
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod paths;
pub mod terrain_tiles;

pub use fixtures::{contour_source, omni_tv_source, square_contour};
pub use paths::{temp_study_dir, temp_test_dir};
pub use terrain_tiles::{write_status_index, write_tile, CellSpec, Compression, TileSpec};
