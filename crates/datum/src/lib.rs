//! Datum conversion between NAD27, NAD83/WGS84, and WGS72.
//!
//! Conversions run through NAD83 as the hub datum. Conversion *to* NAD83 is
//! direct: the input point is matched against a declared list of rectangular
//! regions, and the first region containing it supplies the method: NADCON
//! shift-grid bilinear interpolation, or abridged Molodensky formulas with
//! region datum shifts. Conversion *from* NAD83 inverts the forward mapping
//! iteratively.
//!
//! Conversions are one-way mappings: converting a point and converting it
//! back is not guaranteed to reproduce the input exactly, and callers must
//! not apply conversions incrementally along a path.

pub mod error;
pub mod molodensky;
pub mod nadcon;
mod regions;

pub use error::{DatumError, DatumResult};
pub use regions::{Region, RegionMethod};

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing::debug;

use study_common::LatLon;

use crate::nadcon::NadconTable;

/// Geodetic datums the converter understands. NAD83 and WGS84 are treated
/// as identical at the accuracy of these conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Datum {
    Nad27,
    Nad83,
    Wgs72,
}

/// Residual threshold for the iterative from-NAD83 inversion, degrees.
const INVERSE_TOLERANCE: f64 = 1e-10;

/// Iteration cap for the from-NAD83 inversion.
const INVERSE_MAX_ITERATIONS: usize = 20;

/// Converter holding the region list and lazily mapped NADCON tables.
pub struct DatumConverter {
    table_dir: PathBuf,
    regions: Vec<Region>,
    tables: Vec<OnceCell<NadconTable>>,
}

impl DatumConverter {
    /// Create a converter reading NADCON tables from `table_dir`. Tables are
    /// memory-mapped on first use per region; nothing is opened here.
    pub fn new(table_dir: impl Into<PathBuf>) -> Self {
        let regions = regions::declared_regions();
        let tables = regions.iter().map(|_| OnceCell::new()).collect();
        Self {
            table_dir: table_dir.into(),
            regions,
            tables,
        }
    }

    /// The declared region list, in match order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Convert a point to NAD83.
    pub fn to_nad83(&self, datum: Datum, point: LatLon) -> DatumResult<LatLon> {
        match datum {
            Datum::Nad83 => Ok(point),
            Datum::Nad27 => self.nad27_to_nad83(point),
            Datum::Wgs72 => Ok(molodensky::wgs72_to_nad83(point)),
        }
    }

    /// Convert a NAD83 point to another datum by iteratively inverting the
    /// forward conversion: start from the NAD83 coordinates, back off by the
    /// returned delta, and repeat until both residuals fall below 1e-10
    /// degrees.
    pub fn from_nad83(&self, datum: Datum, point: LatLon) -> DatumResult<LatLon> {
        if datum == Datum::Nad83 {
            return Ok(point);
        }
        let mut guess = point;
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let forward = self.to_nad83(datum, guess)?;
            let lat_residual = forward.lat - point.lat;
            let lon_residual = forward.lon - point.lon;
            if lat_residual.abs() < INVERSE_TOLERANCE && lon_residual.abs() < INVERSE_TOLERANCE {
                return Ok(guess);
            }
            guess.lat -= lat_residual;
            guess.lon -= lon_residual;
        }
        Err(DatumError::IterationDidNotConverge)
    }

    fn nad27_to_nad83(&self, point: LatLon) -> DatumResult<LatLon> {
        for (index, region) in self.regions.iter().enumerate() {
            if !region.contains(point) {
                continue;
            }
            // Overlapping regions resolve by listing order: first hit wins.
            return match &region.method {
                RegionMethod::Nadcon { file } => {
                    let table = self.tables[index].get_or_try_init(|| {
                        let path = self.table_dir.join(file);
                        debug!(region = region.name, path = %path.display(), "mapping NADCON table");
                        NadconTable::open(&path)
                    })?;
                    match table.shift(point) {
                        Some(shifted) => Ok(shifted),
                        // The region box is slightly generous; points inside
                        // the box but off the grid fall through to the next
                        // declared region.
                        None => self.next_region_shift(point, index + 1),
                    }
                }
                RegionMethod::Molodensky(shift) => Ok(molodensky::abridged(point, shift)),
            };
        }
        Err(DatumError::OutsideDataArea)
    }

    fn next_region_shift(&self, point: LatLon, start: usize) -> DatumResult<LatLon> {
        for (offset, region) in self.regions[start..].iter().enumerate() {
            let index = start + offset;
            if !region.contains(point) {
                continue;
            }
            return match &region.method {
                RegionMethod::Nadcon { file } => {
                    let table = self.tables[index].get_or_try_init(|| {
                        NadconTable::open(&self.table_dir.join(file))
                    })?;
                    match table.shift(point) {
                        Some(shifted) => Ok(shifted),
                        None => self.next_region_shift(point, index + 1),
                    }
                }
                RegionMethod::Molodensky(shift) => Ok(molodensky::abridged(point, shift)),
            };
        }
        Err(DatumError::OutsideDataArea)
    }
}
